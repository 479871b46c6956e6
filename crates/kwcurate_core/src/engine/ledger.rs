//! Change ledger: staging and review of imported records.
//!
//! # Responsibility
//! - Stage imported records as `new` under one batch tag.
//! - Accept or reject the whole pending set of a group.
//! - Derive pending counts and live batch tags.
//!
//! # Invariants
//! - Staging is all-or-nothing; any id collision aborts the whole batch.
//! - Accept keeps the batch tag for audit; reject removes records outright
//!   (no trash).
//! - Accept/reject with nothing pending yield an empty mutation, not an error.

use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::group::{Group, Mutation};
use crate::model::record::{BatchTag, Record, RecordId};
use std::collections::{BTreeSet, HashSet};

/// Builds the mutation inserting `records` as `new` members of `batch_tag`.
///
/// # Errors
/// - `DuplicateIdentity` when an id already exists in the group (trashed
///   records included) or appears twice in `records`.
pub fn stage_new(
    group: &Group,
    records: Vec<Record>,
    batch_tag: BatchTag,
) -> LedgerResult<Mutation> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut duplicates: Vec<RecordId> = Vec::new();
    for record in &records {
        if group.contains(record.id) || !seen.insert(record.id) {
            duplicates.push(record.id);
        }
    }
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        duplicates.dedup();
        return Err(LedgerError::DuplicateIdentity(duplicates));
    }

    let mut staged = Vec::with_capacity(records.len());
    for mut record in records {
        record.stage(batch_tag);
        record.validate()?;
        staged.push(record);
    }
    Ok(Mutation::upserting(staged))
}

/// Transitions every pending record to `normal` with an accepted review.
pub fn accept_all(group: &Group) -> Mutation {
    let accepted = group
        .records()
        .iter()
        .filter(|record| record.is_new())
        .map(|record| {
            let mut record = record.clone();
            record.accept();
            record
        })
        .collect();
    Mutation::upserting(accepted)
}

/// Removes every pending record. Callers confirm before invoking.
pub fn reject_all(group: &Group) -> Mutation {
    Mutation::removing(pending_ids(group))
}

pub fn pending_count(group: &Group) -> usize {
    group
        .records()
        .iter()
        .filter(|record| record.is_new())
        .count()
}

/// Tags of batches that still have at least one pending member.
pub fn batch_tags(group: &Group) -> BTreeSet<BatchTag> {
    group
        .records()
        .iter()
        .filter(|record| record.is_new())
        .filter_map(|record| record.batch_tag)
        .collect()
}

fn pending_ids(group: &Group) -> Vec<RecordId> {
    group
        .records()
        .iter()
        .filter(|record| record.is_new())
        .map(|record| record.id)
        .collect()
}
