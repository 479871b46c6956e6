//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contracts the curation engine depends on.
//! - Isolate SQLite query details from engine/service orchestration.
//!
//! # Invariants
//! - Repository writes enforce `Record::validate()` before persistence.
//! - Repository APIs return semantic errors (`GroupNotFound`) in addition to
//!   DB transport errors.

pub mod group_repo;
pub mod record_repo;
pub mod serp_log_repo;
pub mod settings_repo;
