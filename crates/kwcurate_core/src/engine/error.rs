//! Engine error taxonomy.

use crate::model::record::{RecordId, RecordValidationError};
use crate::model::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Structural failures of lifecycle transitions.
///
/// Stale-selection misses and zero-pending accept/reject are not errors; they
/// are absorbed and reported as a count of 0.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Staging collides with ids already present in the group.
    DuplicateIdentity(Vec<RecordId>),
    /// The requested transition is not allowed from the record's state.
    InvalidTransition {
        id: RecordId,
        reason: &'static str,
    },
    /// Optimistic version check failed.
    ConcurrentModification {
        id: RecordId,
        expected: u64,
        actual: Option<u64>,
    },
    /// Referenced id does not exist in the group.
    NotFound(RecordId),
    Schema(SchemaError),
    Validation(RecordValidationError),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentity(ids) => {
                write!(f, "record ids already exist in group: {ids:?}")
            }
            Self::InvalidTransition { id, reason } => {
                write!(f, "invalid transition for record {id}: {reason}")
            }
            Self::ConcurrentModification {
                id,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "record {id} changed concurrently (expected version {expected}, found {actual})"
                ),
                None => write!(
                    f,
                    "record {id} was removed concurrently (expected version {expected})"
                ),
            },
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for LedgerError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<RecordValidationError> for LedgerError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}
