//! Core use-case services.
//!
//! # Responsibility
//! - Own per-group curation state behind explicit session objects.
//! - Orchestrate engine mutations, store writes and observer events.
//! - Keep CLI callers decoupled from storage details.

pub mod curator;
pub mod events;
pub mod session;
