//! Observer notifications for one group session.

use crate::model::record::RecordId;
use serde::Serialize;

/// Broadcast to every subscriber of a group session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GroupEvent {
    RecordsChanged {
        revision: u64,
        upserted: Vec<RecordId>,
        removed: Vec<RecordId>,
    },
    ViewChanged {
        view_revision: u64,
    },
    SelectionChanged {
        selected: usize,
    },
}
