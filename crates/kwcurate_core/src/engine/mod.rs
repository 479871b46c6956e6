//! Record lifecycle and selection-consistency engine.
//!
//! # Responsibility
//! - Keep selections keyed by stable record ids across sort/filter changes.
//! - Compute lifecycle transitions (stage, accept, reject, trash, restore,
//!   purge) as pure mutations over one in-memory group.
//!
//! # Invariants
//! - Engine functions never perform I/O; the session commits their
//!   `Mutation`s through the record store first.
//! - Position lookups always go through an `IdentityIndex` stamped with the
//!   group and view revisions it was built from.

pub mod error;
pub mod group;
pub mod identity_index;
pub mod ledger;
pub mod selection;
pub mod trash;
pub mod view;

pub use error::{LedgerError, LedgerResult};
pub use group::{Group, Mutation};
pub use identity_index::{IdentityIndex, IndexError, IndexStamp};
pub use selection::SelectionSet;
pub use trash::{RetentionHorizon, TrashEntry};
pub use view::{RecordFilter, SortColumn, SortDirection, SortKey, ViewSpec};
