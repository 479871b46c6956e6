//! Identity-keyed selection set.
//!
//! # Invariants
//! - Membership is by `RecordId` only; positions never enter this type.
//! - The range anchor is remembered as an id, never as a position.

use crate::model::record::RecordId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    selected: BTreeSet<RecordId>,
    anchor: Option<RecordId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips membership of `id`. Returns the new membership.
    pub fn toggle(&mut self, id: RecordId) -> bool {
        if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        }
    }

    /// Applies `select` to every id in `ids`; ids outside are untouched.
    pub fn set_range(&mut self, ids: &[RecordId], select: bool) {
        for id in ids {
            if select {
                self.selected.insert(*id);
            } else {
                self.selected.remove(id);
            }
        }
    }

    /// Replaces the whole selection. The anchor is cleared.
    pub fn replace_all(&mut self, ids: impl IntoIterator<Item = RecordId>) {
        self.selected = ids.into_iter().collect();
        self.anchor = None;
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected ids in ascending id order.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.selected.iter().copied()
    }

    pub fn anchor(&self) -> Option<RecordId> {
        self.anchor
    }

    pub fn set_anchor(&mut self, id: Option<RecordId>) {
        self.anchor = id;
    }

    /// Drops ids rejected by `keep`. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(RecordId) -> bool) -> usize {
        let before = self.selected.len();
        self.selected.retain(|id| keep(*id));
        if let Some(anchor) = self.anchor {
            if !keep(anchor) {
                self.anchor = None;
            }
        }
        before - self.selected.len()
    }
}
