//! Campaign and group catalog repository.
//!
//! # Responsibility
//! - Create and list campaigns and the groups (ad groups) they own.
//! - Keep ungrouped groups (no campaign) listable alongside owned ones.
//!
//! # Invariants
//! - Campaign and group names are trimmed and non-blank.
//! - A group's campaign must exist when the group is created.
//! - Listing is deterministic: `campaign_id ASC`, `group_id ASC`.

use crate::model::record::{CampaignId, GroupId};
use crate::repo::record_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const GROUP_SELECT_SQL: &str = "SELECT group_id, campaign_id, name, created_at FROM groups";
const CAMPAIGN_SELECT_SQL: &str = "SELECT campaign_id, name, status, created_at FROM campaigns";

/// Serving state of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Enabled,
    Paused,
    Removed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Paused => "paused",
            Self::Removed => "removed",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" => Some(Self::Enabled),
            "paused" => Some(Self::Paused),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Read model of one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSummary {
    pub campaign_id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Read model of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group_id: GroupId,
    /// Owning campaign; `None` for groups created outside any campaign.
    pub campaign_id: Option<CampaignId>,
    pub name: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Repository interface for the catalog.
pub trait GroupCatalog {
    fn create_campaign(&self, name: &str) -> RepoResult<CampaignSummary>;
    fn get_campaign(&self, campaign_id: CampaignId) -> RepoResult<Option<CampaignSummary>>;
    fn list_campaigns(&self) -> RepoResult<Vec<CampaignSummary>>;
    fn set_campaign_status(&self, campaign_id: CampaignId, status: CampaignStatus)
        -> RepoResult<()>;

    /// Creates a group outside any campaign.
    fn create_group(&self, name: &str) -> RepoResult<GroupSummary>;
    /// Creates a group owned by `campaign_id`.
    ///
    /// # Errors
    /// - `CampaignNotFound` when the campaign does not exist.
    fn create_group_in(&self, campaign_id: CampaignId, name: &str) -> RepoResult<GroupSummary>;
    fn get_group(&self, group_id: GroupId) -> RepoResult<Option<GroupSummary>>;
    fn list_groups(&self) -> RepoResult<Vec<GroupSummary>>;
    /// Groups owned by `campaign_id`.
    ///
    /// # Errors
    /// - `CampaignNotFound` when the campaign does not exist.
    fn list_groups_in(&self, campaign_id: CampaignId) -> RepoResult<Vec<GroupSummary>>;
}

/// SQLite-backed catalog.
pub struct SqliteGroupCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupCatalog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn insert_group(&self, campaign_id: Option<CampaignId>, name: &str) -> RepoResult<GroupSummary> {
        let trimmed = non_blank(name, "group")?;
        self.conn.execute(
            "INSERT INTO groups (campaign_id, name) VALUES (?1, ?2);",
            params![campaign_id, trimmed],
        )?;
        let group_id = self.conn.last_insert_rowid();
        self.get_group(group_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("group {group_id} missing after insert"))
        })
    }

    fn ensure_campaign_exists(&self, campaign_id: CampaignId) -> RepoResult<()> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM campaigns WHERE campaign_id = ?1);",
            [campaign_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::CampaignNotFound(campaign_id));
        }
        Ok(())
    }
}

impl GroupCatalog for SqliteGroupCatalog<'_> {
    fn create_campaign(&self, name: &str) -> RepoResult<CampaignSummary> {
        let trimmed = non_blank(name, "campaign")?;
        self.conn
            .execute("INSERT INTO campaigns (name) VALUES (?1);", params![trimmed])?;
        let campaign_id = self.conn.last_insert_rowid();
        self.get_campaign(campaign_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("campaign {campaign_id} missing after insert"))
        })
    }

    fn get_campaign(&self, campaign_id: CampaignId) -> RepoResult<Option<CampaignSummary>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAMPAIGN_SELECT_SQL} WHERE campaign_id = ?1;"))?;
        let mut rows = stmt.query([campaign_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_campaign_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_campaigns(&self) -> RepoResult<Vec<CampaignSummary>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAMPAIGN_SELECT_SQL} ORDER BY campaign_id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut campaigns = Vec::new();
        while let Some(row) = rows.next()? {
            campaigns.push(parse_campaign_row(row)?);
        }
        Ok(campaigns)
    }

    fn set_campaign_status(
        &self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE campaigns SET status = ?1 WHERE campaign_id = ?2;",
            params![status.as_str(), campaign_id],
        )?;
        if changed == 0 {
            return Err(RepoError::CampaignNotFound(campaign_id));
        }
        Ok(())
    }

    fn create_group(&self, name: &str) -> RepoResult<GroupSummary> {
        self.insert_group(None, name)
    }

    fn create_group_in(&self, campaign_id: CampaignId, name: &str) -> RepoResult<GroupSummary> {
        self.ensure_campaign_exists(campaign_id)?;
        self.insert_group(Some(campaign_id), name)
    }

    fn get_group(&self, group_id: GroupId) -> RepoResult<Option<GroupSummary>> {
        let group = self
            .conn
            .query_row(
                &format!("{GROUP_SELECT_SQL} WHERE group_id = ?1;"),
                [group_id],
                parse_group_row,
            )
            .optional()?;
        Ok(group)
    }

    fn list_groups(&self) -> RepoResult<Vec<GroupSummary>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{GROUP_SELECT_SQL} ORDER BY group_id ASC;"))?;
        let groups = stmt
            .query_map([], parse_group_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn list_groups_in(&self, campaign_id: CampaignId) -> RepoResult<Vec<GroupSummary>> {
        self.ensure_campaign_exists(campaign_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "{GROUP_SELECT_SQL} WHERE campaign_id = ?1 ORDER BY group_id ASC;"
        ))?;
        let groups = stmt
            .query_map([campaign_id], parse_group_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }
}

fn non_blank<'a>(name: &'a str, what: &str) -> RepoResult<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidData(format!(
            "{what} name must not be blank"
        )));
    }
    Ok(trimmed)
}

fn parse_group_row(row: &Row<'_>) -> rusqlite::Result<GroupSummary> {
    Ok(GroupSummary {
        group_id: row.get("group_id")?,
        campaign_id: row.get("campaign_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_campaign_row(row: &Row<'_>) -> RepoResult<CampaignSummary> {
    let status_text: String = row.get("status")?;
    let status = CampaignStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid campaign status `{status_text}` in campaigns.status"
        ))
    })?;
    Ok(CampaignSummary {
        campaign_id: row.get("campaign_id")?,
        name: row.get("name")?,
        status,
        created_at: row.get("created_at")?,
    })
}
