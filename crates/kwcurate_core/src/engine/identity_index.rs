//! Position/identity translation for one rendered view.
//!
//! # Responsibility
//! - Map display positions to stable record ids and back.
//! - Resolve closed position ranges into ids at call time.
//!
//! # Invariants
//! - An index is immutable once built; reorders produce a new index.
//! - `stamp` records the group and view revisions the index was built from.
//!   Callers must rebuild when either revision moved.

use crate::model::record::RecordId;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Revisions an index was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStamp {
    pub group_revision: u64,
    pub view_revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The id is not visible in the current view.
    UnknownId(RecordId),
    /// The position is past the end of the current view.
    PositionOutOfRange { position: usize, len: usize },
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "record {id} is not in the current view"),
            Self::PositionOutOfRange { position, len } => {
                write!(f, "position {position} is out of range for {len} rows")
            }
        }
    }
}

impl Error for IndexError {}

/// Bidirectional position <-> id map.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    order: Vec<RecordId>,
    positions: HashMap<RecordId, usize>,
    stamp: IndexStamp,
}

impl IdentityIndex {
    pub fn build(order: Vec<RecordId>, stamp: IndexStamp) -> Self {
        let positions = order
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        Self {
            order,
            positions,
            stamp,
        }
    }

    pub fn stamp(&self) -> IndexStamp {
        self.stamp
    }

    pub fn is_current(&self, stamp: IndexStamp) -> bool {
        self.stamp == stamp
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in display order.
    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn position_of(&self, id: RecordId) -> Result<usize, IndexError> {
        self.positions
            .get(&id)
            .copied()
            .ok_or(IndexError::UnknownId(id))
    }

    pub fn id_at(&self, position: usize) -> Result<RecordId, IndexError> {
        self.order
            .get(position)
            .copied()
            .ok_or(IndexError::PositionOutOfRange {
                position,
                len: self.order.len(),
            })
    }

    /// Ids occupying `[min(a, b), max(a, b)]`, in display order.
    pub fn resolve_range(&self, a: usize, b: usize) -> Result<Vec<RecordId>, IndexError> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        self.id_at(low)?;
        self.id_at(high)?;
        Ok(self.order[low..=high].to_vec())
    }
}
