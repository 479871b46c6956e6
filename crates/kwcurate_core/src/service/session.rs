//! Group session: the explicit store for one group's curation state.
//!
//! # Responsibility
//! - Own the in-memory group, current view, identity index and selection.
//! - Commit engine mutations through the record store, then publish
//!   `GroupEvent`s to subscribers.
//! - Serve as the dispatch target for bulk operations on this group.
//!
//! # Invariants
//! - All record mutations of a group serialize through the session lock.
//! - The store is written before in-memory state changes; a failed write
//!   leaves the session untouched.
//! - The identity index is rebuilt whenever the group or view revision moved
//!   since it was built.
//! - Stale selection ids are dropped on every commit and on resolve.
//! - New record ids continue from the store's high-water mark, so a removed
//!   id is never reissued.

use crate::codec::{ClipboardCodec, CodecError, CommaSpaceCodec, CopyMode, ImportedRow};
use crate::db::now_epoch_ms;
use crate::dispatch::{BulkAction, DispatchTarget, EnrichmentResult, LeaseSlot};
use crate::engine::{
    ledger, trash, Group, IdentityIndex, IndexError, IndexStamp, LedgerError, Mutation,
    RetentionHorizon, SelectionSet, TrashEntry, ViewSpec,
};
use crate::model::record::{BatchTag, FieldValue, GroupId, Record, RecordId};
use crate::model::schema::{FieldSchema, SchemaError, STATUS_FIELD};
use crate::repo::record_repo::{RecordStore, RepoError};
use crate::repo::serp_log_repo::{SerpLog, SerpLogEntry, SerpLogStore};
use crate::service::events::GroupEvent;
use log::{info, warn};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Session-level error.
#[derive(Debug)]
pub enum SessionError {
    Ledger(LedgerError),
    Repo(RepoError),
    Index(IndexError),
    Codec(CodecError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::Codec(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Index(err) => Some(err),
            Self::Codec(err) => Some(err),
        }
    }
}

impl From<LedgerError> for SessionError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<SchemaError> for SessionError {
    fn from(value: SchemaError) -> Self {
        Self::Ledger(LedgerError::Schema(value))
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<IndexError> for SessionError {
    fn from(value: IndexError) -> Self {
        Self::Index(value)
    }
}

impl From<CodecError> for SessionError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Result of adding or pasting keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Ids of the newly staged records, in input order.
    pub added: Vec<RecordId>,
    /// Inputs dropped because the keyword already exists in the group.
    pub skipped: usize,
    /// Batch of the staged records; `None` when nothing was added.
    pub batch_tag: Option<BatchTag>,
}

struct SessionState {
    group: Group,
    view: ViewSpec,
    view_revision: u64,
    index: IdentityIndex,
    selection: SelectionSet,
}

impl SessionState {
    fn stamp(&self) -> IndexStamp {
        IndexStamp {
            group_revision: self.group.revision(),
            view_revision: self.view_revision,
        }
    }

    fn refresh_index(&mut self) {
        let stamp = self.stamp();
        if !self.index.is_current(stamp) {
            self.index = IdentityIndex::build(self.view.arrange(self.group.records()), stamp);
        }
    }

    fn drop_stale_selection(&mut self) -> usize {
        let group = &self.group;
        self.selection.retain(|id| group.contains(id))
    }
}

/// Curation state of one group plus its command surface.
pub struct GroupSession<S: RecordStore> {
    group_id: GroupId,
    store: S,
    schema: FieldSchema,
    codec: Box<dyn ClipboardCodec>,
    serp_log: Option<Box<dyn SerpLogStore>>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<GroupEvent>,
    lease: LeaseSlot,
}

impl<S: RecordStore> GroupSession<S> {
    /// Loads `group_id` from `store`.
    ///
    /// # Errors
    /// - `RepoError::GroupNotFound` when the group does not exist.
    pub fn open(group_id: GroupId, store: S) -> SessionResult<Self> {
        let records = store.list(group_id)?;
        let floor = store.next_record_id(group_id)?;
        let group = Group::from_records(group_id, records).with_next_record_id(floor);
        let view = ViewSpec::default();
        let stamp = IndexStamp {
            group_revision: group.revision(),
            view_revision: 0,
        };
        let index = IdentityIndex::build(view.arrange(group.records()), stamp);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            "event=session_open module=service status=ok group_id={} records={}",
            group_id,
            group.len()
        );

        Ok(Self {
            group_id,
            store,
            schema: FieldSchema::keywords(),
            codec: Box::new(CommaSpaceCodec::default()),
            serp_log: None,
            state: Mutex::new(SessionState {
                group,
                view,
                view_revision: 0,
                index,
                selection: SelectionSet::new(),
            }),
            events,
            lease: LeaseSlot::new(),
        })
    }

    /// Replaces the clipboard codec.
    pub fn with_codec(mut self, codec: Box<dyn ClipboardCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Keeps enrichment attempts of this group in `serp_log`.
    pub fn with_serp_log(mut self, serp_log: Box<dyn SerpLogStore>) -> Self {
        self.serp_log = Some(serp_log);
        self
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    /// True while a bulk dispatch holds this group's lease.
    pub fn is_busy(&self) -> bool {
        self.lease.is_held()
    }

    // ---- records -------------------------------------------------------

    /// Every record of the group, trashed ones included, in group order.
    pub fn records(&self) -> Vec<Record> {
        self.lock().group.records().to_vec()
    }

    pub fn record(&self, id: RecordId) -> Option<Record> {
        self.lock().group.get(id).cloned()
    }

    pub fn version_of(&self, id: RecordId) -> Option<u64> {
        self.lock().group.version_of(id)
    }

    pub fn revision(&self) -> u64 {
        self.lock().group.revision()
    }

    // ---- view and identity index ---------------------------------------

    /// Replaces the current sort/filter. Selection is kept.
    pub fn set_view(&self, view: ViewSpec) {
        let view_revision = {
            let mut state = self.lock();
            state.view = view;
            state.view_revision += 1;
            state.view_revision
        };
        self.publish(GroupEvent::ViewChanged { view_revision });
    }

    /// Visible ids in display order.
    pub fn visible_ids(&self) -> Vec<RecordId> {
        let mut state = self.lock();
        state.refresh_index();
        state.index.ids().to_vec()
    }

    /// Visible records in display order.
    pub fn visible_records(&self) -> Vec<Record> {
        let mut state = self.lock();
        state.refresh_index();
        let state = &*state;
        state
            .index
            .ids()
            .iter()
            .filter_map(|id| state.group.get(*id).cloned())
            .collect()
    }

    pub fn position_of(&self, id: RecordId) -> SessionResult<usize> {
        let mut state = self.lock();
        state.refresh_index();
        Ok(state.index.position_of(id)?)
    }

    pub fn id_at(&self, position: usize) -> SessionResult<RecordId> {
        let mut state = self.lock();
        state.refresh_index();
        Ok(state.index.id_at(position)?)
    }

    /// Ids currently displayed in `[min(a, b), max(a, b)]`.
    pub fn resolve_range(&self, a: usize, b: usize) -> SessionResult<Vec<RecordId>> {
        let mut state = self.lock();
        state.refresh_index();
        Ok(state.index.resolve_range(a, b)?)
    }

    // ---- selection -----------------------------------------------------

    /// Checkbox click on the row at `position`.
    ///
    /// A plain click toggles the row and makes it the anchor. A shift-click
    /// applies the anchor row's current selection state to every row between
    /// the anchor and `position`. When the anchor is unset or not visible a
    /// shift-click behaves as a plain click.
    pub fn click_row(&self, position: usize, shift: bool) -> SessionResult<()> {
        let selected = {
            let mut guard = self.lock();
            guard.refresh_index();
            let state = &mut *guard;
            let clicked = state.index.id_at(position)?;

            let anchor = if shift {
                state
                    .selection
                    .anchor()
                    .and_then(|id| state.index.position_of(id).ok().map(|pos| (id, pos)))
            } else {
                None
            };

            match anchor {
                Some((anchor_id, anchor_pos)) => {
                    let select = state.selection.contains(anchor_id);
                    let range = state.index.resolve_range(anchor_pos, position)?;
                    state.selection.set_range(&range, select);
                }
                None => {
                    state.selection.toggle(clicked);
                    state.selection.set_anchor(Some(clicked));
                }
            }
            state.selection.len()
        };
        self.publish(GroupEvent::SelectionChanged { selected });
        Ok(())
    }

    /// Toggles one id. Returns its new membership.
    pub fn toggle(&self, id: RecordId) -> SessionResult<bool> {
        let (now_selected, selected) = {
            let mut state = self.lock();
            if !state.group.contains(id) {
                return Err(LedgerError::NotFound(id).into());
            }
            let now_selected = state.selection.toggle(id);
            (now_selected, state.selection.len())
        };
        self.publish(GroupEvent::SelectionChanged { selected });
        Ok(now_selected)
    }

    /// Applies `select` to the rows displayed between two positions.
    pub fn select_range(&self, a: usize, b: usize, select: bool) -> SessionResult<usize> {
        let selected = {
            let mut guard = self.lock();
            guard.refresh_index();
            let state = &mut *guard;
            let range = state.index.resolve_range(a, b)?;
            state.selection.set_range(&range, select);
            state.selection.len()
        };
        self.publish(GroupEvent::SelectionChanged { selected });
        Ok(selected)
    }

    /// Replaces the selection with the given ids. Unknown ids are dropped and
    /// repeated ids count once. Returns the new selection size.
    pub fn select_only(&self, ids: &[RecordId]) -> usize {
        let selected = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let group = &state.group;
            state
                .selection
                .replace_all(ids.iter().copied().filter(|id| group.contains(*id)));
            state.selection.len()
        };
        self.publish(GroupEvent::SelectionChanged { selected });
        selected
    }

    /// Replaces the selection with every currently visible id.
    pub fn apply_filter_as_selection(&self) -> usize {
        let selected = {
            let mut guard = self.lock();
            guard.refresh_index();
            let state = &mut *guard;
            state.selection.replace_all(state.index.ids().iter().copied());
            state.selection.len()
        };
        self.publish(GroupEvent::SelectionChanged { selected });
        selected
    }

    pub fn clear_selection(&self) {
        self.lock().selection.clear();
        self.publish(GroupEvent::SelectionChanged { selected: 0 });
    }

    pub fn selection(&self) -> SelectionSet {
        self.lock().selection.clone()
    }

    /// Drops stale ids and returns the remaining active selected ids.
    ///
    /// Visible ids come first in display order, followed by selected ids the
    /// current filter hides, ascending.
    pub fn resolve_selection(&self) -> Vec<RecordId> {
        let mut guard = self.lock();
        let dropped = guard.drop_stale_selection();
        if dropped > 0 {
            info!(
                "event=selection_resolve module=service status=ok group_id={} dropped={}",
                self.group_id, dropped
            );
        }
        guard.refresh_index();
        let state = &*guard;

        let mut resolved: Vec<RecordId> = state
            .index
            .ids()
            .iter()
            .copied()
            .filter(|id| state.selection.contains(*id))
            .collect();
        let visible: HashSet<RecordId> = resolved.iter().copied().collect();
        resolved.extend(state.selection.ids().filter(|id| {
            !visible.contains(id)
                && state
                    .group
                    .get(*id)
                    .is_some_and(|record| record.is_active())
        }));
        resolved
    }

    // ---- change ledger -------------------------------------------------

    /// Stages `records` as one new batch.
    ///
    /// # Errors
    /// - `DuplicateIdentity` when any id already exists; nothing is staged.
    pub fn stage_new(&self, records: Vec<Record>, batch_tag: BatchTag) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = ledger::stage_new(&state.group, records, batch_tag)?;
        let staged = self.commit(&mut state, mutation)?;
        info!(
            "event=stage_new module=service status=ok group_id={} staged={} batch_tag={}",
            self.group_id, staged, batch_tag
        );
        Ok(staged)
    }

    /// Adds plain keywords (comma or newline separated) as one new batch.
    ///
    /// Keywords already present in the group are skipped.
    pub fn add_keywords(&self, text: &str) -> SessionResult<AddOutcome> {
        let rows = text
            .split([',', '\n'])
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .map(|keyword| ImportedRow {
                keyword: keyword.to_string(),
                fields: self.schema.text_import_defaults(),
            })
            .collect();
        self.stage_rows(rows)
    }

    /// Pastes a clipboard payload into this group as one new batch.
    pub fn paste(&self, text: &str, mode: CopyMode) -> SessionResult<AddOutcome> {
        let mut rows = self.codec.decode_rows(text, mode)?;
        if mode == CopyMode::KeywordsOnly {
            for row in &mut rows {
                row.fields = self.schema.text_import_defaults();
            }
        }
        self.stage_rows(rows)
    }

    /// Encodes the resolved selection for the clipboard.
    pub fn copy_selection(&self, mode: CopyMode) -> String {
        let ids = self.resolve_selection();
        let records: Vec<Record> = {
            let state = self.lock();
            ids.iter()
                .filter_map(|id| state.group.get(*id).cloned())
                .collect()
        };
        self.codec.encode(&records, mode)
    }

    /// Accepts every pending record. Returns the number accepted.
    pub fn accept_all(&self) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = ledger::accept_all(&state.group);
        let accepted = self.commit(&mut state, mutation)?;
        info!(
            "event=accept_all module=service status=ok group_id={} accepted={}",
            self.group_id, accepted
        );
        Ok(accepted)
    }

    /// Permanently removes every pending record. Irreversible; callers must
    /// confirm first.
    pub fn reject_all(&self) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = ledger::reject_all(&state.group);
        let rejected = self.commit(&mut state, mutation)?;
        info!(
            "event=reject_all module=service status=ok group_id={} rejected={}",
            self.group_id, rejected
        );
        Ok(rejected)
    }

    pub fn pending_count(&self) -> usize {
        ledger::pending_count(&self.lock().group)
    }

    pub fn batch_tags(&self) -> BTreeSet<BatchTag> {
        ledger::batch_tags(&self.lock().group)
    }

    // ---- trash ---------------------------------------------------------

    /// Soft-deletes `ids` at `now`. Already trashed ids count as 0.
    pub fn move_to_trash(&self, ids: &[RecordId], now: i64) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = trash::move_to_trash(&state.group, ids, now)?;
        let trashed = self.commit(&mut state, mutation)?;
        info!(
            "event=trash_move module=service status=ok group_id={} trashed={}",
            self.group_id, trashed
        );
        Ok(trashed)
    }

    pub fn restore(&self, ids: &[RecordId]) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = trash::restore(&state.group, ids)?;
        let restored = self.commit(&mut state, mutation)?;
        info!(
            "event=trash_restore module=service status=ok group_id={} restored={}",
            self.group_id, restored
        );
        Ok(restored)
    }

    /// Purges every entry expired at `now`.
    ///
    /// Runs under the session lock, so a concurrent `restore` of the same id
    /// either completes first (entry no longer trashed, not purged) or finds
    /// the id gone (`InvalidTransition`).
    pub fn purge_expired(&self, now: i64, horizon: RetentionHorizon) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = trash::purge_expired(&state.group, now, horizon);
        let purged = self.commit(&mut state, mutation)?;
        if purged > 0 {
            info!(
                "event=trash_purge module=service status=ok group_id={} purged={}",
                self.group_id, purged
            );
        }
        Ok(purged)
    }

    pub fn delete_permanently(&self, ids: &[RecordId]) -> SessionResult<usize> {
        let mut state = self.lock();
        let mutation = trash::delete_permanently(&state.group, ids)?;
        self.commit(&mut state, mutation)
    }

    /// Days before `id` is purged.
    ///
    /// # Errors
    /// - `NotFound` when the id does not exist.
    /// - `InvalidTransition` when the record is not in trash.
    pub fn days_remaining(
        &self,
        id: RecordId,
        now: i64,
        horizon: RetentionHorizon,
    ) -> SessionResult<u32> {
        let state = self.lock();
        let record = state.group.get(id).ok_or(LedgerError::NotFound(id))?;
        let deleted_at = record.deleted_at.ok_or(LedgerError::InvalidTransition {
            id,
            reason: "record is not in trash",
        })?;
        Ok(horizon.days_remaining(deleted_at, now))
    }

    pub fn trash_entries(&self, now: i64, horizon: RetentionHorizon) -> Vec<TrashEntry> {
        trash::trash_entries(&self.lock().group, now, horizon)
    }

    // ---- field edits ---------------------------------------------------

    /// Writes (or clears) one editable field on every existing id.
    ///
    /// Ids that no longer exist are skipped.
    pub fn update_field(
        &self,
        ids: &[RecordId],
        field: &str,
        value: Option<FieldValue>,
    ) -> SessionResult<usize> {
        self.schema.check_editable(field, value.as_ref())?;
        let mut state = self.lock();
        self.write_field(&mut state, ids, field, value)
    }

    /// Writes one editable field on `id` only if it is still at
    /// `expected_version`.
    ///
    /// # Errors
    /// - `ConcurrentModification` when another write landed first.
    pub fn update_field_checked(
        &self,
        id: RecordId,
        expected_version: u64,
        field: &str,
        value: Option<FieldValue>,
    ) -> SessionResult<()> {
        self.schema.check_editable(field, value.as_ref())?;
        let mut state = self.lock();
        state.group.check_version(id, expected_version)?;
        self.write_field(&mut state, &[id], field, value)?;
        Ok(())
    }

    /// Sets the `status` choice on every existing id.
    pub fn set_status(&self, ids: &[RecordId], status: &str) -> SessionResult<usize> {
        let value = FieldValue::text(status);
        self.schema.check_value(STATUS_FIELD, &value)?;
        let mut state = self.lock();
        self.write_field(&mut state, ids, STATUS_FIELD, Some(value))
    }

    // ---- enrichment history --------------------------------------------

    /// Enrichment attempts recorded for `id`, oldest first. Empty when no
    /// history store is attached.
    pub fn serp_history(&self, id: RecordId) -> SessionResult<Vec<SerpLog>> {
        match &self.serp_log {
            Some(serp_log) => Ok(serp_log.list_for_record(self.group_id, id)?),
            None => Ok(Vec::new()),
        }
    }

    // ---- internals -----------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: GroupEvent) {
        let _ = self.events.send(event);
    }

    fn stage_rows(&self, rows: Vec<ImportedRow>) -> SessionResult<AddOutcome> {
        let mut state = self.lock();
        let mut known: HashSet<String> = state
            .group
            .records()
            .iter()
            .map(|record| record.keyword.clone())
            .collect();

        let mut next_id = state.group.next_record_id();
        let mut records = Vec::new();
        let mut skipped = 0;
        for row in rows {
            if !known.insert(row.keyword.clone()) {
                skipped += 1;
                continue;
            }
            let mut record = Record::new(next_id, row.keyword);
            record.fields = row.fields;
            records.push(record);
            next_id += 1;
        }

        if records.is_empty() {
            return Ok(AddOutcome {
                added: Vec::new(),
                skipped,
                batch_tag: None,
            });
        }

        let batch_tag = BatchTag::generate();
        let added: Vec<RecordId> = records.iter().map(|record| record.id).collect();
        let mutation = ledger::stage_new(&state.group, records, batch_tag)?;
        self.commit(&mut state, mutation)?;
        info!(
            "event=keywords_add module=service status=ok group_id={} added={} skipped={} batch_tag={}",
            self.group_id,
            added.len(),
            skipped,
            batch_tag
        );
        Ok(AddOutcome {
            added,
            skipped,
            batch_tag: Some(batch_tag),
        })
    }

    fn write_field(
        &self,
        state: &mut SessionState,
        ids: &[RecordId],
        field: &str,
        value: Option<FieldValue>,
    ) -> SessionResult<usize> {
        let mut seen = HashSet::new();
        let targets: Vec<RecordId> = ids
            .iter()
            .copied()
            .filter(|id| state.group.contains(*id) && seen.insert(*id))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let updated: Vec<Record> = targets
            .iter()
            .filter_map(|id| state.group.get(*id))
            .map(|record| {
                let mut record = record.clone();
                record.set_field(field, value.clone());
                record
            })
            .collect();

        self.store
            .update_field(self.group_id, &targets, field, value.as_ref())?;
        Ok(self.apply_committed(state, Mutation::upserting(updated)))
    }

    /// Persists `mutation`, then applies it in memory.
    fn commit(&self, state: &mut SessionState, mutation: Mutation) -> SessionResult<usize> {
        if mutation.is_empty() {
            return Ok(0);
        }
        if let Err(err) = self.persist(&mutation) {
            warn!(
                "event=session_commit module=service status=error group_id={} error={}",
                self.group_id, err
            );
            return Err(err.into());
        }
        Ok(self.apply_committed(state, mutation))
    }

    fn persist(&self, mutation: &Mutation) -> Result<(), RepoError> {
        if !mutation.upserts.is_empty() {
            self.store.upsert(self.group_id, &mutation.upserts)?;
        }
        if !mutation.removals.is_empty() {
            self.store.delete(self.group_id, &mutation.removals)?;
        }
        Ok(())
    }

    fn apply_committed(&self, state: &mut SessionState, mutation: Mutation) -> usize {
        let count = mutation.len();
        let upserted = mutation.upserts.iter().map(|record| record.id).collect();
        let removed = mutation.removals.clone();
        state.group.apply(mutation);
        state.drop_stale_selection();
        self.publish(GroupEvent::RecordsChanged {
            revision: state.group.revision(),
            upserted,
            removed,
        });
        count
    }
}

impl<S: RecordStore> DispatchTarget for GroupSession<S> {
    type Error = SessionError;

    fn group_id(&self) -> GroupId {
        self.group_id
    }

    fn lease(&self) -> &LeaseSlot {
        &self.lease
    }

    fn validate_action(&self, action: &BulkAction) -> Result<(), Self::Error> {
        match action {
            BulkAction::Delete | BulkAction::Enrich(_) => Ok(()),
            BulkAction::SetField { field, value } => {
                Ok(self.schema.check_editable(field, value.as_ref())?)
            }
            BulkAction::SetStatus { status } => Ok(self
                .schema
                .check_value(STATUS_FIELD, &FieldValue::text(status.as_str()))?),
        }
    }

    fn snapshot(&self, id: RecordId) -> Option<(Record, u64)> {
        let state = self.lock();
        let record = state.group.get(id)?.clone();
        let version = state.group.version_of(id)?;
        Some((record, version))
    }

    fn apply_bulk(&self, ids: &[RecordId], action: &BulkAction) -> Result<usize, Self::Error> {
        match action {
            BulkAction::Delete => self.move_to_trash(ids, now_epoch_ms()),
            BulkAction::SetField { field, value } => self.update_field(ids, field, value.clone()),
            BulkAction::SetStatus { status } => self.set_status(ids, status),
            BulkAction::Enrich(_) => Err(LedgerError::InvalidTransition {
                id: ids.first().copied().unwrap_or_default(),
                reason: "enrichment is applied item by item",
            }
            .into()),
        }
    }

    fn commit_enrichment(
        &self,
        id: RecordId,
        expected_version: u64,
        result: &EnrichmentResult,
    ) -> Result<(), Self::Error> {
        for (field, value) in &result.fields {
            self.schema.check_value(field, value)?;
        }

        let mut state = self.lock();
        state.group.check_version(id, expected_version)?;
        let mut record = state
            .group
            .get(id)
            .cloned()
            .ok_or(LedgerError::NotFound(id))?;
        if !record.is_active() {
            return Err(LedgerError::InvalidTransition {
                id,
                reason: "record was trashed during enrichment",
            }
            .into());
        }
        for (field, value) in &result.fields {
            record.set_field(field, Some(value.clone()));
        }
        record.enriched_at = Some(now_epoch_ms());
        self.commit(&mut state, Mutation::upserting(vec![record]))?;
        Ok(())
    }

    fn record_attempt(&self, entry: &SerpLogEntry) -> Result<(), Self::Error> {
        if let Some(serp_log) = &self.serp_log {
            serp_log.append(self.group_id, entry)?;
        }
        Ok(())
    }
}
