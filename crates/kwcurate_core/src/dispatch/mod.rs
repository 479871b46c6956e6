//! Bulk operation dispatch.
//!
//! # Responsibility
//! - Apply one `BulkAction` to a resolved id list.
//! - Run enrichment item by item on a background task with streamed progress,
//!   per-item failure capture, cooperative cancellation and cost accounting.
//!
//! # Invariants
//! - At most one dispatch holds a group's lease at a time.
//! - Progress events of one dispatch carry strictly increasing `processed`.
//! - Exactly one terminal event ends every dispatch stream, and nothing
//!   follows it.

pub mod action;
pub mod cost;
pub mod dispatcher;
pub mod enrichment;
pub mod progress;

pub use action::{ActionKind, BulkAction, EnrichParams};
pub use cost::{format_micros, CostEstimate, CostModel};
pub use dispatcher::{
    estimate_cost, BulkDispatcher, DispatchError, DispatchHandle, DispatchSettings, DispatchTarget,
    GroupLease, LeaseSlot,
};
pub use enrichment::{
    classify_intent, EnrichmentProvider, EnrichmentResult, ProviderError, SerpCounts,
    SerpProfile, SerpSnapshot,
};
pub use progress::{DispatchEvent, DispatchReport, FailedItem, ProgressEvent};
