//! Core domain logic for kwcurate, a keyword curation engine.
//! This crate is the single source of truth for record lifecycle and
//! selection invariants.

pub mod codec;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use codec::{ClipboardCodec, CodecError, CommaSpaceCodec, CopyMode, Decoded, ImportedRow};
pub use config::{ConfigError, CuratorConfig};
pub use dispatch::{
    BulkAction, BulkDispatcher, DispatchError, DispatchEvent, DispatchHandle, DispatchReport,
    EnrichParams, EnrichmentProvider, EnrichmentResult, FailedItem, ProgressEvent, ProviderError,
};
pub use engine::{
    LedgerError, RecordFilter, RetentionHorizon, SelectionSet, SortColumn, SortDirection,
    SortKey, TrashEntry, ViewSpec,
};
pub use logging::{default_log_level, init_logging, log_spec, logging_status, LoggingError};
pub use model::record::{
    BatchTag, CampaignId, FieldValue, GroupId, LifecycleState, Record, RecordId, RecordValidationError,
    ReviewState,
};
pub use model::schema::{FieldSchema, SchemaError};
pub use repo::group_repo::{CampaignStatus, CampaignSummary, GroupSummary};
pub use repo::record_repo::{RecordStore, RepoError, RepoResult, SqliteRecordStore};
pub use repo::serp_log_repo::{SerpLog, SerpLogEntry, SerpOutcome};
pub use service::curator::{Curator, SweepReport};
pub use service::events::GroupEvent;
pub use service::session::{AddOutcome, GroupSession, SessionError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
