//! Trash store: soft delete, restore and expiry.
//!
//! # Responsibility
//! - Move records into and out of trash.
//! - Decide expiry against a retention horizon and purge expired entries.
//!
//! # Invariants
//! - An entry is expired exactly when `now - deleted_at >= horizon`, which is
//!   also exactly when `days_remaining == 0`.
//! - Re-trashing an already trashed record is a no-op.
//! - Restoring a record that is not trashed, or trashing/restoring an id that
//!   no longer exists, is an `InvalidTransition`.

use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::group::{Group, Mutation};
use crate::model::record::{Record, RecordId};

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// How long a trashed record survives before purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionHorizon {
    millis: i64,
}

impl RetentionHorizon {
    pub fn from_days(days: u32) -> Self {
        Self {
            millis: i64::from(days) * DAY_MS,
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis: millis.max(0),
        }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// True once `deleted_at` is at least one horizon in the past.
    pub fn is_expired(&self, deleted_at: i64, now: i64) -> bool {
        now.saturating_sub(deleted_at) >= self.millis
    }

    /// Whole days left before purge, rounded up and floored at zero.
    pub fn days_remaining(&self, deleted_at: i64, now: i64) -> u32 {
        let left = self.millis - now.saturating_sub(deleted_at);
        if left <= 0 {
            return 0;
        }
        let days = (left + DAY_MS - 1) / DAY_MS;
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}

/// A trashed record as shown in the trash view.
#[derive(Debug, Clone, PartialEq)]
pub struct TrashEntry {
    pub record: Record,
    pub deleted_at: i64,
    pub days_remaining: u32,
}

/// Soft-deletes `ids` at `now`. Already trashed ids are skipped.
pub fn move_to_trash(group: &Group, ids: &[RecordId], now: i64) -> LedgerResult<Mutation> {
    let mut trashed: Vec<Record> = Vec::new();
    for id in ids {
        let record = group.get(*id).ok_or(LedgerError::InvalidTransition {
            id: *id,
            reason: "record no longer exists",
        })?;
        if record.is_trashed() || trashed.iter().any(|staged| staged.id == *id) {
            continue;
        }
        let mut record = record.clone();
        record.soft_delete(now);
        trashed.push(record);
    }
    Ok(Mutation::upserting(trashed))
}

/// Returns trashed `ids` to their resting state.
pub fn restore(group: &Group, ids: &[RecordId]) -> LedgerResult<Mutation> {
    let mut restored: Vec<Record> = Vec::new();
    for id in ids {
        if restored.iter().any(|record| record.id == *id) {
            continue;
        }
        let record = group.get(*id).ok_or(LedgerError::InvalidTransition {
            id: *id,
            reason: "record no longer exists",
        })?;
        if !record.is_trashed() {
            return Err(LedgerError::InvalidTransition {
                id: *id,
                reason: "record is not in trash",
            });
        }
        let mut record = record.clone();
        record.restore();
        restored.push(record);
    }
    Ok(Mutation::upserting(restored))
}

/// Removes every expired trash entry.
pub fn purge_expired(group: &Group, now: i64, horizon: RetentionHorizon) -> Mutation {
    let expired = group
        .records()
        .iter()
        .filter(|record| match record.deleted_at {
            Some(deleted_at) => record.is_trashed() && horizon.is_expired(deleted_at, now),
            None => false,
        })
        .map(|record| record.id)
        .collect();
    Mutation::removing(expired)
}

/// Purges trashed `ids` immediately. Ids already gone are skipped.
pub fn delete_permanently(group: &Group, ids: &[RecordId]) -> LedgerResult<Mutation> {
    let mut removals = Vec::new();
    for id in ids {
        let Some(record) = group.get(*id) else {
            continue;
        };
        if !record.is_trashed() {
            return Err(LedgerError::InvalidTransition {
                id: *id,
                reason: "only trashed records can be deleted permanently",
            });
        }
        if !removals.contains(id) {
            removals.push(*id);
        }
    }
    Ok(Mutation::removing(removals))
}

/// Trash contents, most recently deleted first.
pub fn trash_entries(group: &Group, now: i64, horizon: RetentionHorizon) -> Vec<TrashEntry> {
    let mut entries: Vec<TrashEntry> = group
        .records()
        .iter()
        .filter_map(|record| {
            let deleted_at = record.deleted_at?;
            Some(TrashEntry {
                record: record.clone(),
                deleted_at,
                days_remaining: horizon.days_remaining(deleted_at, now),
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.deleted_at
            .cmp(&a.deleted_at)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::{
        delete_permanently, move_to_trash, purge_expired, restore, RetentionHorizon, DAY_MS,
    };
    use crate::engine::error::LedgerError;
    use crate::engine::group::Group;
    use crate::model::record::Record;

    #[test]
    fn days_remaining_rounds_up_and_hits_zero_at_boundary() {
        let horizon = RetentionHorizon::from_days(30);
        assert_eq!(horizon.days_remaining(0, 0), 30);
        assert_eq!(horizon.days_remaining(0, 1), 30);
        assert_eq!(horizon.days_remaining(0, 29 * DAY_MS + 1), 1);
        assert_eq!(horizon.days_remaining(0, 30 * DAY_MS - 1), 1);
        assert_eq!(horizon.days_remaining(0, 30 * DAY_MS), 0);
        assert!(!horizon.is_expired(0, 30 * DAY_MS - 1));
        assert!(horizon.is_expired(0, 30 * DAY_MS));
    }

    #[test]
    fn retrash_is_a_noop() {
        let mut group = Group::from_records(1, vec![Record::new(1, "a")]);
        group.apply(move_to_trash(&group, &[1], 100).unwrap());

        let again = move_to_trash(&group, &[1], 200).unwrap();
        assert!(again.is_empty());
        assert_eq!(group.get(1).and_then(|record| record.deleted_at), Some(100));
    }

    #[test]
    fn restore_requires_trashed_record() {
        let group = Group::from_records(1, vec![Record::new(1, "a")]);
        assert!(matches!(
            restore(&group, &[1]),
            Err(LedgerError::InvalidTransition { id: 1, .. })
        ));
        assert!(matches!(
            restore(&group, &[42]),
            Err(LedgerError::InvalidTransition { id: 42, .. })
        ));
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let mut group = Group::from_records(
            1,
            vec![Record::new(1, "old"), Record::new(2, "young"), Record::new(3, "live")],
        );
        group.apply(move_to_trash(&group, &[1], 0).unwrap());
        group.apply(move_to_trash(&group, &[2], DAY_MS).unwrap());

        let horizon = RetentionHorizon::from_days(1);
        let mutation = purge_expired(&group, DAY_MS, horizon);
        assert_eq!(mutation.removals, vec![1]);
    }

    #[test]
    fn delete_permanently_rejects_active_records() {
        let group = Group::from_records(1, vec![Record::new(1, "a")]);
        assert!(matches!(
            delete_permanently(&group, &[1]),
            Err(LedgerError::InvalidTransition { id: 1, .. })
        ));
        assert!(delete_permanently(&group, &[77]).unwrap().is_empty());
    }
}
