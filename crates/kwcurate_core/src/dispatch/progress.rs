//! Dispatch stream messages.

use crate::dispatch::action::ActionKind;
use crate::model::record::RecordId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub current_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: RecordId,
    pub reason: String,
}

/// Summary of a finished dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub action: ActionKind,
    /// Ids handed to the dispatcher.
    pub requested: usize,
    /// Ids that no longer existed when the dispatch started.
    pub dropped: usize,
    /// Ids excluded by skip-already-enriched.
    pub skipped: usize,
    pub succeeded_count: usize,
    pub failed_items: Vec<FailedItem>,
    pub cancelled: bool,
    pub estimated_cost_micros: u64,
    pub total_cost_micros: u64,
}

/// One message on a dispatch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchEvent {
    Progress(ProgressEvent),
    Complete { summary: DispatchReport },
    Error { message: String },
}

impl DispatchEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}
