//! Keyword record domain model.
//!
//! # Responsibility
//! - Define the canonical keyword record owned by one group.
//! - Provide lifecycle helpers for staging, review and soft-delete semantics.
//!
//! # Invariants
//! - `id` is stable and unique within its group while the record exists.
//! - `review != None` implies `lifecycle != New`.
//! - `deleted_at.is_some()` iff `lifecycle == Trashed`.
//! - `ReviewState::Rejected` is transient: rejected records are removed, never
//!   persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable record identifier, unique within one group.
///
/// Kept as a type alias to mirror the record store primary key.
pub type RecordId = i64;

/// Stable group identifier.
pub type GroupId = i64;

/// Campaign owning a set of groups.
pub type CampaignId = i64;

/// Palette used to tint batches in grid views.
pub const BATCH_COLORS: [&str; 12] = [
    "#fff2cc", "#e1d5e7", "#dae8fc", "#d5e8d4", "#ffe6cc", "#f8cecc", "#e1fffe", "#fff2e6",
    "#f0e6ff", "#e6f3ff", "#ffe6f2", "#e6ffe6",
];

/// Opaque token shared by every record created by one bulk-import operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchTag(Uuid);

impl BatchTag {
    /// Generates a fresh, never-reused batch tag.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Deterministic palette color for UI grouping.
    ///
    /// The same tag always maps onto the same color; distinct tags may share
    /// one since the palette is small.
    pub fn color(&self) -> &'static str {
        let bytes = self.0.as_bytes();
        let folded = bytes.iter().fold(0usize, |acc, byte| {
            acc.wrapping_mul(31).wrapping_add(usize::from(*byte))
        });
        BATCH_COLORS[folded % BATCH_COLORS.len()]
    }
}

impl Display for BatchTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse lifecycle position of a record inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Regular curated record.
    Normal,
    /// Staged by a bulk import and waiting for accept/reject.
    New,
    /// Soft-deleted; lives in trash until restored or purged.
    Trashed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::New => "new",
            Self::Trashed => "trashed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Self::Normal),
            "new" => Some(Self::New),
            "trashed" => Some(Self::Trashed),
            _ => None,
        }
    }
}

/// Review outcome of a staged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    None,
    Accepted,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Renders the value the way grid cells and clipboard payloads show it.
    pub fn render(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Number(value) => value.to_string(),
            Self::Flag(value) => value.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Validation failures for record state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankKeyword(RecordId),
    ReviewedWhileNew(RecordId),
    DeletedAtMismatch(RecordId),
    RejectedPersisted(RecordId),
    UnreviewedBatchMember(RecordId),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankKeyword(id) => write!(f, "record {id} has a blank keyword"),
            Self::ReviewedWhileNew(id) => {
                write!(f, "record {id} carries a review outcome while still new")
            }
            Self::DeletedAtMismatch(id) => write!(
                f,
                "record {id} must have deleted_at set exactly when trashed"
            ),
            Self::RejectedPersisted(id) => {
                write!(f, "record {id} is rejected and must not be stored")
            }
            Self::UnreviewedBatchMember(id) => write!(
                f,
                "record {id} left its batch without a review outcome"
            ),
        }
    }
}

impl Error for RecordValidationError {}

/// Canonical keyword record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// The keyword text itself. Always the first clipboard column.
    pub keyword: String,
    /// Mutable schema fields keyed by field name.
    pub fields: BTreeMap<String, FieldValue>,
    pub lifecycle: LifecycleState,
    pub review: ReviewState,
    /// Import batch that created this record; kept after review for audit.
    pub batch_tag: Option<BatchTag>,
    /// Epoch milliseconds. Set only while trashed.
    pub deleted_at: Option<i64>,
    /// Epoch milliseconds of the last successful enrichment.
    pub enriched_at: Option<i64>,
}

impl Record {
    /// Creates a normal record with no fields.
    pub fn new(id: RecordId, keyword: impl Into<String>) -> Self {
        Self {
            id,
            keyword: keyword.into(),
            fields: BTreeMap::new(),
            lifecycle: LifecycleState::Normal,
            review: ReviewState::None,
            batch_tag: None,
            deleted_at: None,
            enriched_at: None,
        }
    }

    /// Builder-style field setter used by import paths and tests.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: Option<FieldValue>) {
        match value {
            Some(value) => {
                self.fields.insert(name.to_string(), value);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }

    pub fn is_new(&self) -> bool {
        self.lifecycle == LifecycleState::New
    }

    pub fn is_trashed(&self) -> bool {
        self.lifecycle == LifecycleState::Trashed
    }

    /// Visible in the main grid (anything not in trash).
    pub fn is_active(&self) -> bool {
        !self.is_trashed()
    }

    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }

    /// Marks this record as staged by the given batch.
    pub fn stage(&mut self, batch_tag: BatchTag) {
        self.lifecycle = LifecycleState::New;
        self.review = ReviewState::None;
        self.batch_tag = Some(batch_tag);
        self.deleted_at = None;
    }

    /// Accepts a staged record. The batch tag is kept for audit.
    pub fn accept(&mut self) {
        self.lifecycle = LifecycleState::Normal;
        self.review = ReviewState::Accepted;
    }

    /// Moves this record into trash. Review state is preserved.
    pub fn soft_delete(&mut self, now_ms: i64) {
        self.lifecycle = LifecycleState::Trashed;
        self.deleted_at = Some(now_ms);
    }

    /// Leaves trash, returning to the state held before trashing.
    ///
    /// A batch member that was never reviewed re-enters as `new`.
    pub fn restore(&mut self) {
        self.lifecycle = self.resting_state();
        self.deleted_at = None;
    }

    /// State this record occupies when it is not in trash.
    pub fn resting_state(&self) -> LifecycleState {
        if self.batch_tag.is_some() && self.review == ReviewState::None {
            LifecycleState::New
        } else {
            LifecycleState::Normal
        }
    }

    /// Validates record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.keyword.trim().is_empty() {
            return Err(RecordValidationError::BlankKeyword(self.id));
        }
        if self.review != ReviewState::None && self.lifecycle == LifecycleState::New {
            return Err(RecordValidationError::ReviewedWhileNew(self.id));
        }
        if self.deleted_at.is_some() != (self.lifecycle == LifecycleState::Trashed) {
            return Err(RecordValidationError::DeletedAtMismatch(self.id));
        }
        if self.review == ReviewState::Rejected {
            return Err(RecordValidationError::RejectedPersisted(self.id));
        }
        if self.lifecycle == LifecycleState::Normal
            && self.batch_tag.is_some()
            && self.review == ReviewState::None
        {
            return Err(RecordValidationError::UnreviewedBatchMember(self.id));
        }
        Ok(())
    }
}
