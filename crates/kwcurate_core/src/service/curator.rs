//! Curator: catalog-level entry point over one SQLite database.
//!
//! # Responsibility
//! - Own the shared connection, campaign/group catalog and persisted
//!   settings.
//! - Hand out one cached `GroupSession` per group so every mutation of a
//!   group serializes through the same session.
//! - Run the trash expiry sweep across all groups.
//!
//! # Invariants
//! - The retention horizon is read once per sweep.
//! - The connection lock is never held while a session is being driven.

use crate::config::CuratorConfig;
use crate::db::{open_db, open_db_in_memory};
use crate::dispatch::{BulkDispatcher, EnrichmentProvider};
use crate::engine::RetentionHorizon;
use crate::model::record::{CampaignId, GroupId};
use crate::repo::group_repo::{
    CampaignStatus, CampaignSummary, GroupCatalog, GroupSummary, SqliteGroupCatalog,
};
use crate::repo::record_repo::{
    share_connection, RepoError, SharedConnection, SqliteRecordStore,
};
use crate::repo::serp_log_repo::SqliteSerpLogStore;
use crate::repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
use crate::service::session::{GroupSession, SessionResult};
use log::info;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SqliteSession = GroupSession<SqliteRecordStore>;

/// Outcome of one trash sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub groups: usize,
    pub purged: usize,
    pub retention_days: u32,
}

pub struct Curator {
    conn: SharedConnection,
    config: CuratorConfig,
    sessions: Mutex<HashMap<GroupId, Arc<SqliteSession>>>,
}

impl Curator {
    /// Opens (and migrates) the database named by `config.storage.db_path`.
    pub fn open(config: CuratorConfig) -> Result<Self, RepoError> {
        let conn = open_db(&config.storage.db_path)?;
        Ok(Self::with_connection(conn, config))
    }

    pub fn open_in_memory(config: CuratorConfig) -> Result<Self, RepoError> {
        let conn = open_db_in_memory()?;
        Ok(Self::with_connection(conn, config))
    }

    /// Wraps an already migrated connection.
    pub fn with_connection(conn: Connection, config: CuratorConfig) -> Self {
        Self {
            conn: share_connection(conn),
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    pub fn create_campaign(&self, name: &str) -> Result<CampaignSummary, RepoError> {
        let conn = self.conn_lock();
        let campaign = SqliteGroupCatalog::new(&conn).create_campaign(name)?;
        info!(
            "event=campaign_create module=service status=ok campaign_id={}",
            campaign.campaign_id
        );
        Ok(campaign)
    }

    pub fn list_campaigns(&self) -> Result<Vec<CampaignSummary>, RepoError> {
        let conn = self.conn_lock();
        SqliteGroupCatalog::new(&conn).list_campaigns()
    }

    pub fn set_campaign_status(
        &self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> Result<(), RepoError> {
        let conn = self.conn_lock();
        SqliteGroupCatalog::new(&conn).set_campaign_status(campaign_id, status)?;
        info!(
            "event=campaign_status module=service status=ok campaign_id={} value={}",
            campaign_id,
            status.as_str()
        );
        Ok(())
    }

    /// Creates a group outside any campaign.
    pub fn create_group(&self, name: &str) -> Result<GroupSummary, RepoError> {
        let conn = self.conn_lock();
        let group = SqliteGroupCatalog::new(&conn).create_group(name)?;
        info!(
            "event=group_create module=service status=ok group_id={}",
            group.group_id
        );
        Ok(group)
    }

    pub fn create_group_in(
        &self,
        campaign_id: CampaignId,
        name: &str,
    ) -> Result<GroupSummary, RepoError> {
        let conn = self.conn_lock();
        let group = SqliteGroupCatalog::new(&conn).create_group_in(campaign_id, name)?;
        info!(
            "event=group_create module=service status=ok group_id={} campaign_id={}",
            group.group_id, campaign_id
        );
        Ok(group)
    }

    pub fn list_groups(&self) -> Result<Vec<GroupSummary>, RepoError> {
        let conn = self.conn_lock();
        SqliteGroupCatalog::new(&conn).list_groups()
    }

    pub fn list_groups_in(&self, campaign_id: CampaignId) -> Result<Vec<GroupSummary>, RepoError> {
        let conn = self.conn_lock();
        SqliteGroupCatalog::new(&conn).list_groups_in(campaign_id)
    }

    /// Session of `group_id`, loading it on first use.
    pub fn group(&self, group_id: GroupId) -> SessionResult<Arc<SqliteSession>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(&group_id) {
            return Ok(Arc::clone(session));
        }
        let store = SqliteRecordStore::new(Arc::clone(&self.conn));
        let serp_log = SqliteSerpLogStore::new(Arc::clone(&self.conn));
        let session =
            Arc::new(GroupSession::open(group_id, store)?.with_serp_log(Box::new(serp_log)));
        sessions.insert(group_id, Arc::clone(&session));
        Ok(session)
    }

    /// Persisted retention days, or the configured default.
    pub fn retention_days(&self) -> Result<u32, RepoError> {
        let conn = self.conn_lock();
        let persisted = SqliteSettingsRepository::new(&conn).trash_retention_days()?;
        Ok(persisted.unwrap_or(self.config.trash.retention_days))
    }

    pub fn set_retention_days(&self, days: u32) -> Result<(), RepoError> {
        let conn = self.conn_lock();
        SqliteSettingsRepository::new(&conn).set_trash_retention_days(days)?;
        info!(
            "event=settings_update module=service status=ok key=trash_retention_days value={}",
            days
        );
        Ok(())
    }

    pub fn retention_horizon(&self) -> Result<RetentionHorizon, RepoError> {
        Ok(RetentionHorizon::from_days(self.retention_days()?))
    }

    /// Purges expired trash in every group at `now`.
    pub fn sweep_trash(&self, now: i64) -> SessionResult<SweepReport> {
        let retention_days = self.retention_days()?;
        let horizon = RetentionHorizon::from_days(retention_days);
        let groups = self.list_groups()?;

        let mut purged = 0;
        for group in &groups {
            purged += self.group(group.group_id)?.purge_expired(now, horizon)?;
        }

        info!(
            "event=trash_sweep module=service status=ok groups={} purged={} retention_days={}",
            groups.len(),
            purged,
            retention_days
        );
        Ok(SweepReport {
            groups: groups.len(),
            purged,
            retention_days,
        })
    }

    /// Dispatcher configured from `[enrichment]`.
    pub fn dispatcher(&self, provider: Arc<dyn EnrichmentProvider>) -> BulkDispatcher {
        BulkDispatcher::new(provider, self.config.enrichment.dispatch_settings())
    }

    /// Dispatcher for delete and field/status edits; rejects enrichment.
    pub fn edit_dispatcher(&self) -> BulkDispatcher {
        BulkDispatcher::without_enrichment(self.config.enrichment.dispatch_settings())
    }

    fn conn_lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
