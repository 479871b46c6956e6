//! Persisted application settings.
//!
//! # Responsibility
//! - Store operator-tunable values that must survive restarts, such as the
//!   trash retention horizon.
//!
//! # Invariants
//! - Values are stored as text and parsed strictly on read.

use crate::repo::record_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

pub const TRASH_RETENTION_KEY: &str = "trash_retention_days";

/// Repository interface for key/value settings.
pub trait SettingsRepository {
    /// Returns the persisted trash retention horizon in days, if set.
    fn trash_retention_days(&self) -> RepoResult<Option<u32>>;
    fn set_trash_retention_days(&self, days: u32) -> RepoResult<()>;
}

/// SQLite-backed settings repository.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT setting_value FROM settings WHERE setting_key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (setting_key, setting_value) VALUES (?1, ?2)
             ON CONFLICT (setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn trash_retention_days(&self) -> RepoResult<Option<u32>> {
        match self.get(TRASH_RETENTION_KEY)? {
            Some(raw) => raw.trim().parse::<u32>().map(Some).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid value `{raw}` for setting `{TRASH_RETENTION_KEY}`"
                ))
            }),
            None => Ok(None),
        }
    }

    fn set_trash_retention_days(&self, days: u32) -> RepoResult<()> {
        self.put(TRASH_RETENTION_KEY, &days.to_string())
    }
}
