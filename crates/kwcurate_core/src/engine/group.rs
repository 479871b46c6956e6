//! In-memory group state.
//!
//! # Responsibility
//! - Hold the ordered records of one group together with per-record write
//!   versions and a group revision counter.
//! - Apply committed `Mutation`s.
//!
//! # Invariants
//! - Record order is insertion order; views reorder, the group never does.
//! - Every applied upsert bumps that record's version.
//! - Any non-empty mutation bumps the group revision.
//! - The next record id never decreases, so ids of removed records are not
//!   handed out again.

use crate::engine::error::{LedgerError, LedgerResult};
use crate::model::record::{GroupId, Record, RecordId};
use std::collections::{HashMap, HashSet};

/// Writes computed by the engine, committed to the store before `Group::apply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    pub upserts: Vec<Record>,
    pub removals: Vec<RecordId>,
}

impl Mutation {
    pub fn upserting(upserts: Vec<Record>) -> Self {
        Self {
            upserts,
            removals: Vec::new(),
        }
    }

    pub fn removing(removals: Vec<RecordId>) -> Self {
        Self {
            upserts: Vec::new(),
            removals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Number of records touched.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}

/// Ordered mutable container of records.
#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    records: Vec<Record>,
    slots: HashMap<RecordId, usize>,
    versions: HashMap<RecordId, u64>,
    revision: u64,
    next_id: RecordId,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self::from_records(id, Vec::new())
    }

    /// Builds a group from stored records, in store order.
    pub fn from_records(id: GroupId, records: Vec<Record>) -> Self {
        let versions = records.iter().map(|record| (record.id, 1)).collect();
        let next_id = records
            .iter()
            .map(|record| record.id)
            .max()
            .map_or(1, |max| max + 1);
        let mut group = Self {
            id,
            records,
            slots: HashMap::new(),
            versions,
            revision: 0,
            next_id,
        };
        group.reindex();
        group
    }

    /// Raises the id high-water mark to at least `floor`.
    ///
    /// Used when the store remembers ids of records that no longer exist.
    pub fn with_next_record_id(mut self, floor: RecordId) -> Self {
        self.next_id = self.next_id.max(floor);
        self
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Monotonic counter bumped on every applied mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.slots.get(&id).map(|slot| &self.records[*slot])
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn version_of(&self, id: RecordId) -> Option<u64> {
        self.versions.get(&id).copied()
    }

    /// Fails with `ConcurrentModification` unless `id` is still at `expected`.
    pub fn check_version(&self, id: RecordId, expected: u64) -> LedgerResult<()> {
        let actual = self.version_of(id);
        if actual == Some(expected) {
            return Ok(());
        }
        Err(LedgerError::ConcurrentModification {
            id,
            expected,
            actual,
        })
    }

    /// Next free id, one past the highest id this group has ever held.
    pub fn next_record_id(&self) -> RecordId {
        self.next_id
    }

    /// Applies an already-committed mutation.
    pub fn apply(&mut self, mutation: Mutation) {
        if mutation.is_empty() {
            return;
        }

        if !mutation.removals.is_empty() {
            let removed: HashSet<RecordId> = mutation.removals.iter().copied().collect();
            self.records.retain(|record| !removed.contains(&record.id));
            for id in &removed {
                self.versions.remove(id);
            }
            self.reindex();
        }

        for record in mutation.upserts {
            let id = record.id;
            match self.slots.get(&id) {
                Some(slot) => self.records[*slot] = record,
                None => {
                    self.slots.insert(id, self.records.len());
                    self.records.push(record);
                }
            }
            *self.versions.entry(id).or_insert(0) += 1;
            self.next_id = self.next_id.max(id + 1);
        }

        self.revision += 1;
    }

    fn reindex(&mut self) {
        self.slots = self
            .records
            .iter()
            .enumerate()
            .map(|(slot, record)| (record.id, slot))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::{Group, Mutation};
    use crate::engine::error::LedgerError;
    use crate::model::record::Record;

    #[test]
    fn apply_bumps_versions_and_revision() {
        let mut group = Group::from_records(1, vec![Record::new(1, "a"), Record::new(2, "b")]);
        assert_eq!(group.version_of(1), Some(1));

        group.apply(Mutation::upserting(vec![Record::new(1, "a2"), Record::new(3, "c")]));

        assert_eq!(group.revision(), 1);
        assert_eq!(group.version_of(1), Some(2));
        assert_eq!(group.version_of(3), Some(1));
        let ids: Vec<_> = group.records().iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(group.get(1).map(|record| record.keyword.as_str()), Some("a2"));
    }

    #[test]
    fn removals_drop_records_and_versions() {
        let mut group = Group::from_records(
            1,
            vec![Record::new(1, "a"), Record::new(2, "b"), Record::new(3, "c")],
        );
        group.apply(Mutation::removing(vec![2]));

        assert!(!group.contains(2));
        assert_eq!(group.version_of(2), None);
        assert_eq!(group.get(3).map(|record| record.id), Some(3));
        assert_eq!(group.next_record_id(), 4);
    }

    #[test]
    fn removing_the_tail_does_not_free_its_id() {
        let mut group = Group::from_records(1, vec![Record::new(1, "a"), Record::new(2, "b")]);
        group.apply(Mutation::upserting(vec![Record::new(3, "doomed")]));
        group.apply(Mutation::removing(vec![3]));

        assert_eq!(group.next_record_id(), 4);

        group.apply(Mutation::removing(vec![1, 2]));
        assert!(group.is_empty());
        assert_eq!(group.next_record_id(), 4);
    }

    #[test]
    fn stored_floor_only_raises_next_id() {
        let group = Group::from_records(1, vec![Record::new(5, "a")]);
        assert_eq!(group.clone().with_next_record_id(9).next_record_id(), 9);
        assert_eq!(group.with_next_record_id(2).next_record_id(), 6);
    }

    #[test]
    fn empty_mutation_keeps_revision() {
        let mut group = Group::new(7);
        group.apply(Mutation::default());
        assert_eq!(group.revision(), 0);
        assert_eq!(group.next_record_id(), 1);
    }

    #[test]
    fn stale_version_is_rejected() {
        let mut group = Group::from_records(1, vec![Record::new(1, "a")]);
        group.apply(Mutation::upserting(vec![Record::new(1, "b")]));

        assert_eq!(
            group.check_version(1, 1),
            Err(LedgerError::ConcurrentModification {
                id: 1,
                expected: 1,
                actual: Some(2),
            })
        );
        assert!(group.check_version(1, 2).is_ok());
    }
}
