//! Record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the four storage operations the curation engine relies on:
//!   `list`, `upsert`, `delete`, `update_field`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Record::validate()` before SQL mutations.
//! - Multi-record writes are atomic (one transaction per call).
//! - Read paths reject invalid persisted state instead of masking it.
//! - `list` returns records in insertion order (`seq ASC`).
//! - `groups.next_record_id` only moves forward; deletes never lower it.

use crate::db::DbError;
use crate::model::record::{
    BatchTag, CampaignId, FieldValue, GroupId, LifecycleState, Record, RecordId, RecordValidationError,
    ReviewState,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    record_id,
    keyword,
    fields_json,
    lifecycle_state,
    review_state,
    batch_tag,
    deleted_at,
    enriched_at
FROM records";

pub type RepoResult<T> = Result<T, RepoError>;

/// SQLite connection shared between record stores and catalog callers.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Wraps a migrated connection for sharing across sessions.
pub fn share_connection(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Generic repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    GroupNotFound(GroupId),
    CampaignNotFound(CampaignId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
            Self::CampaignNotFound(id) => write!(f, "campaign not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::GroupNotFound(_) => None,
            Self::CampaignNotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(format!("field map is not valid json: {value}"))
    }
}

/// Storage contract required by the curation engine.
///
/// Implementations must be safe to share with background dispatch tasks.
pub trait RecordStore: Send + Sync + 'static {
    /// Lists every record of one group, trashed ones included.
    fn list(&self, group_id: GroupId) -> RepoResult<Vec<Record>>;
    /// Inserts or fully replaces records. New records keep insertion order.
    fn upsert(&self, group_id: GroupId, records: &[Record]) -> RepoResult<()>;
    /// Hard-deletes records. Returns the number of rows removed.
    fn delete(&self, group_id: GroupId, ids: &[RecordId]) -> RepoResult<usize>;
    /// Writes (or clears, for `None`) one field on many records.
    fn update_field(
        &self,
        group_id: GroupId,
        ids: &[RecordId],
        field: &str,
        value: Option<&FieldValue>,
    ) -> RepoResult<usize>;
    /// Lowest id never used in the group, deleted records included.
    ///
    /// Stores without a durable high-water mark fall back to `1`; the
    /// in-memory group then derives its own from the listed records.
    fn next_record_id(&self, _group_id: GroupId) -> RepoResult<RecordId> {
        Ok(1)
    }
}

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: SharedConnection,
}

impl SqliteRecordStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Runs `f` with exclusive access to the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> T) -> T {
        let mut guard = self.lock();
        f(&mut guard)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for SqliteRecordStore {
    fn list(&self, group_id: GroupId) -> RepoResult<Vec<Record>> {
        let conn = self.lock();
        ensure_group_exists(&conn, group_id)?;

        let mut stmt = conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE group_id = ?1
             ORDER BY seq ASC, record_id ASC;"
        ))?;
        let mut rows = stmt.query([group_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn upsert(&self, group_id: GroupId, records: &[Record]) -> RepoResult<()> {
        for record in records {
            record.validate()?;
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock();
        ensure_group_exists(&conn, group_id)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (
                    group_id,
                    record_id,
                    seq,
                    keyword,
                    fields_json,
                    lifecycle_state,
                    review_state,
                    batch_tag,
                    deleted_at,
                    enriched_at
                ) VALUES (
                    ?1,
                    ?2,
                    (SELECT COALESCE(MAX(seq), -1) + 1 FROM records WHERE group_id = ?1),
                    ?3, ?4, ?5, ?6, ?7, ?8, ?9
                )
                ON CONFLICT (group_id, record_id) DO UPDATE SET
                    keyword = excluded.keyword,
                    fields_json = excluded.fields_json,
                    lifecycle_state = excluded.lifecycle_state,
                    review_state = excluded.review_state,
                    batch_tag = excluded.batch_tag,
                    deleted_at = excluded.deleted_at,
                    enriched_at = excluded.enriched_at,
                    updated_at = (strftime('%s', 'now') * 1000);",
            )?;
            for record in records {
                stmt.execute(params![
                    group_id,
                    record.id,
                    record.keyword.as_str(),
                    serde_json::to_string(&record.fields)?,
                    record.lifecycle.as_str(),
                    record.review.as_str(),
                    record.batch_tag.map(|tag| tag.to_string()),
                    record.deleted_at,
                    record.enriched_at,
                ])?;
            }
        }
        if let Some(highest) = records.iter().map(|record| record.id).max() {
            tx.execute(
                "UPDATE groups
                 SET next_record_id = MAX(next_record_id, ?2 + 1)
                 WHERE group_id = ?1;",
                params![group_id, highest],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, group_id: GroupId, ids: &[RecordId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt =
                tx.prepare("DELETE FROM records WHERE group_id = ?1 AND record_id = ?2;")?;
            for id in ids {
                removed += stmt.execute(params![group_id, id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn update_field(
        &self,
        group_id: GroupId,
        ids: &[RecordId],
        field: &str,
        value: Option<&FieldValue>,
    ) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if !is_plain_field_name(field) {
            return Err(RepoError::InvalidData(format!(
                "field name `{field}` is not a plain identifier"
            )));
        }

        let path = format!("$.{field}");
        let encoded = value.map(serde_json::to_string).transpose()?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = if encoded.is_some() {
                tx.prepare(
                    "UPDATE records
                     SET
                        fields_json = json_set(fields_json, ?1, json(?2)),
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE group_id = ?3 AND record_id = ?4;",
                )?
            } else {
                tx.prepare(
                    "UPDATE records
                     SET
                        fields_json = json_remove(fields_json, ?1),
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE group_id = ?3 AND record_id = ?4 AND ?2 IS NULL;",
                )?
            };
            for id in ids {
                changed += stmt.execute(params![path, encoded, group_id, id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn next_record_id(&self, group_id: GroupId) -> RepoResult<RecordId> {
        let conn = self.lock();
        let next = conn
            .query_row(
                "SELECT next_record_id FROM groups WHERE group_id = ?1;",
                [group_id],
                |row| row.get::<_, RecordId>(0),
            )
            .optional()?;
        next.ok_or(RepoError::GroupNotFound(group_id))
    }
}

fn ensure_group_exists(conn: &Connection, group_id: GroupId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM groups WHERE group_id = ?1);",
        [group_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(RepoError::GroupNotFound(group_id));
    }
    Ok(())
}

fn is_plain_field_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let id: RecordId = row.get("record_id")?;

    let fields_text: String = row.get("fields_json")?;
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&fields_text)?;

    let state_text: String = row.get("lifecycle_state")?;
    let lifecycle = LifecycleState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid lifecycle state `{state_text}` in records.lifecycle_state"
        ))
    })?;

    let review_text: String = row.get("review_state")?;
    let review = ReviewState::parse(&review_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid review state `{review_text}` in records.review_state"
        ))
    })?;

    let batch_tag = match row.get::<_, Option<String>>("batch_tag")? {
        Some(value) => Some(BatchTag::from_uuid(Uuid::parse_str(&value).map_err(|_| {
            RepoError::InvalidData(format!("invalid batch tag `{value}` in records.batch_tag"))
        })?)),
        None => None,
    };

    let record = Record {
        id,
        keyword: row.get("keyword")?,
        fields,
        lifecycle,
        review,
        batch_tag,
        deleted_at: row.get("deleted_at")?,
        enriched_at: row.get("enriched_at")?,
    };
    record.validate()?;
    Ok(record)
}
