//! Enrichment history (`serp_logs`).
//!
//! # Responsibility
//! - Append one row per enrichment attempt: request parameters, outcome,
//!   result-page counts, derived flags, intent and billed cost.
//! - List the history of one record, oldest first.
//!
//! # Invariants
//! - Rows belong to an existing record and disappear with it.
//! - Failed attempts carry an error message and cost nothing.

use crate::dispatch::{EnrichParams, EnrichmentResult, SerpCounts};
use crate::model::record::{FieldValue, GroupId, Record, RecordId};
use crate::repo::record_repo::{RepoError, RepoResult, SharedConnection};
use rusqlite::{params, Connection, Row};
use std::sync::{MutexGuard, PoisonError};

const SERP_LOG_SELECT_SQL: &str = "SELECT
    log_id,
    group_id,
    record_id,
    keyword_text,
    location_code,
    language_code,
    device,
    depth,
    outcome,
    error_message,
    attempts,
    total_items,
    organic_count,
    paid_count,
    maps_count,
    shopping_count,
    has_ads,
    has_google_maps,
    has_our_site,
    has_school_sites,
    intent_type,
    cost_micros,
    created_at
FROM serp_logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerpOutcome {
    Succeeded,
    Failed(String),
}

/// One enrichment attempt, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SerpLogEntry {
    pub record_id: RecordId,
    pub keyword: String,
    pub location_code: u32,
    pub language_code: String,
    pub device: String,
    pub depth: u32,
    pub outcome: SerpOutcome,
    /// Provider calls spent on this item, retries included.
    pub attempts: u32,
    pub counts: Option<SerpCounts>,
    pub has_ads: Option<bool>,
    pub has_google_maps: Option<bool>,
    pub has_our_site: Option<bool>,
    pub has_school_sites: Option<bool>,
    pub intent_type: Option<String>,
    pub cost_micros: u64,
}

impl SerpLogEntry {
    fn request(record: &Record, params: &EnrichParams, outcome: SerpOutcome, attempts: u32) -> Self {
        Self {
            record_id: record.id,
            keyword: record.keyword.clone(),
            location_code: params.location_code,
            language_code: params.language_code.clone(),
            device: params.device.clone(),
            depth: params.depth,
            outcome,
            attempts: attempts.max(1),
            counts: None,
            has_ads: None,
            has_google_maps: None,
            has_our_site: None,
            has_school_sites: None,
            intent_type: None,
            cost_micros: 0,
        }
    }

    pub fn succeeded(
        record: &Record,
        params: &EnrichParams,
        result: &EnrichmentResult,
        cost_micros: u64,
        attempts: u32,
    ) -> Self {
        let flag = |name: &str| match result.fields.get(name) {
            Some(FieldValue::Flag(value)) => Some(*value),
            _ => None,
        };
        let mut entry = Self::request(record, params, SerpOutcome::Succeeded, attempts);
        entry.counts = result.serp_counts;
        entry.has_ads = flag("has_ads");
        entry.has_google_maps = flag("has_google_maps");
        entry.has_our_site = flag("has_our_site");
        entry.has_school_sites = flag("has_school_sites");
        entry.intent_type = result
            .fields
            .get("intent_type")
            .and_then(FieldValue::as_text)
            .map(str::to_string);
        entry.cost_micros = cost_micros;
        entry
    }

    pub fn failed(record: &Record, params: &EnrichParams, reason: &str, attempts: u32) -> Self {
        Self::request(
            record,
            params,
            SerpOutcome::Failed(reason.to_string()),
            attempts,
        )
    }
}

/// Stored history row.
#[derive(Debug, Clone, PartialEq)]
pub struct SerpLog {
    pub log_id: i64,
    pub group_id: GroupId,
    pub entry: SerpLogEntry,
    /// Epoch ms.
    pub created_at: i64,
}

/// Storage contract for enrichment history.
pub trait SerpLogStore: Send + Sync + 'static {
    /// Appends one attempt. Returns the new row id.
    fn append(&self, group_id: GroupId, entry: &SerpLogEntry) -> RepoResult<i64>;
    fn list_for_record(&self, group_id: GroupId, record_id: RecordId) -> RepoResult<Vec<SerpLog>>;
}

/// SQLite-backed history over the shared connection.
#[derive(Clone)]
pub struct SqliteSerpLogStore {
    conn: SharedConnection,
}

impl SqliteSerpLogStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerpLogStore for SqliteSerpLogStore {
    fn append(&self, group_id: GroupId, entry: &SerpLogEntry) -> RepoResult<i64> {
        let conn = self.lock();
        insert_serp_log(&conn, group_id, entry)
    }

    fn list_for_record(&self, group_id: GroupId, record_id: RecordId) -> RepoResult<Vec<SerpLog>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{SERP_LOG_SELECT_SQL}
             WHERE group_id = ?1 AND record_id = ?2
             ORDER BY created_at ASC, log_id ASC;"
        ))?;
        let mut rows = stmt.query(params![group_id, record_id])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_serp_log_row(row)?);
        }
        Ok(logs)
    }
}

fn insert_serp_log(conn: &Connection, group_id: GroupId, entry: &SerpLogEntry) -> RepoResult<i64> {
    let error_message = match &entry.outcome {
        SerpOutcome::Succeeded => None,
        SerpOutcome::Failed(message) => Some(message.as_str()),
    };
    let outcome = if error_message.is_some() {
        "failed"
    } else {
        "succeeded"
    };
    let counts = entry.counts;
    let cost = i64::try_from(entry.cost_micros).map_err(|_| {
        RepoError::InvalidData(format!("cost {} does not fit a row", entry.cost_micros))
    })?;

    conn.execute(
        "INSERT INTO serp_logs (
            group_id, record_id, keyword_text,
            location_code, language_code, device, depth,
            outcome, error_message, attempts,
            total_items, organic_count, paid_count, maps_count, shopping_count,
            has_ads, has_google_maps, has_our_site, has_school_sites,
            intent_type, cost_micros
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19,
            ?20, ?21
        );",
        params![
            group_id,
            entry.record_id,
            entry.keyword.as_str(),
            entry.location_code,
            entry.language_code.as_str(),
            entry.device.as_str(),
            entry.depth,
            outcome,
            error_message,
            entry.attempts,
            counts.map(|c| c.total_items),
            counts.map(|c| c.organic_count),
            counts.map(|c| c.paid_count),
            counts.map(|c| c.maps_count),
            counts.map(|c| c.shopping_count),
            entry.has_ads,
            entry.has_google_maps,
            entry.has_our_site,
            entry.has_school_sites,
            entry.intent_type.as_deref(),
            cost,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_serp_log_row(row: &Row<'_>) -> RepoResult<SerpLog> {
    let outcome_text: String = row.get("outcome")?;
    let error_message: Option<String> = row.get("error_message")?;
    let outcome = match (outcome_text.as_str(), error_message) {
        ("succeeded", None) => SerpOutcome::Succeeded,
        ("failed", Some(message)) => SerpOutcome::Failed(message),
        (other, _) => {
            return Err(RepoError::InvalidData(format!(
                "invalid outcome `{other}` in serp_logs.outcome"
            )))
        }
    };

    let total_items: Option<u32> = row.get("total_items")?;
    let counts = match total_items {
        Some(total_items) => Some(SerpCounts {
            total_items,
            organic_count: row.get::<_, Option<u32>>("organic_count")?.unwrap_or(0),
            paid_count: row.get::<_, Option<u32>>("paid_count")?.unwrap_or(0),
            maps_count: row.get::<_, Option<u32>>("maps_count")?.unwrap_or(0),
            shopping_count: row.get::<_, Option<u32>>("shopping_count")?.unwrap_or(0),
        }),
        None => None,
    };

    let cost: i64 = row.get("cost_micros")?;
    Ok(SerpLog {
        log_id: row.get("log_id")?,
        group_id: row.get("group_id")?,
        entry: SerpLogEntry {
            record_id: row.get("record_id")?,
            keyword: row.get("keyword_text")?,
            location_code: row.get("location_code")?,
            language_code: row.get("language_code")?,
            device: row.get("device")?,
            depth: row.get("depth")?,
            outcome,
            attempts: row.get("attempts")?,
            counts,
            has_ads: row.get("has_ads")?,
            has_google_maps: row.get("has_google_maps")?,
            has_our_site: row.get("has_our_site")?,
            has_school_sites: row.get("has_school_sites")?,
            intent_type: row.get("intent_type")?,
            cost_micros: u64::try_from(cost).map_err(|_| {
                RepoError::InvalidData(format!("negative cost {cost} in serp_logs.cost_micros"))
            })?,
        },
        created_at: row.get("created_at")?,
    })
}
