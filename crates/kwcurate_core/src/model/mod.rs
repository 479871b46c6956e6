//! Domain model for keyword curation.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep the typed field schema next to the record it describes.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId` within its group.
//! - Deletion is a soft-delete into trash; purge is the only hard delete
//!   besides rejecting staged records.

pub mod record;
pub mod schema;
