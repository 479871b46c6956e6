//! kwcurate command line.
//!
//! Thin driver over `kwcurate_core`: every command opens the configured
//! database, runs one session operation and prints the outcome. Bulk edits
//! go through the dispatcher and print its event stream.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use kwcurate_core::db::now_epoch_ms;
use kwcurate_core::dispatch::{estimate_cost, format_micros};
use kwcurate_core::model::schema::parse_value;
use kwcurate_core::service::curator::SqliteSession;
use kwcurate_core::{
    init_logging, BulkAction, CampaignId, CopyMode, Curator, CuratorConfig, DispatchEvent,
    GroupId, RecordId, SerpOutcome,
};
use log::info;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kwcurate")]
#[command(about = "Keyword group curation", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "KWCURATE_CONFIG", default_value = "kwcurate.toml")]
    config: PathBuf,

    /// Database path, overriding `storage.db_path`
    #[arg(long, env = "KWCURATE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or migrate) the database
    Init,

    /// Manage campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommand,
    },

    /// Manage keyword groups
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },

    /// Stage keywords from text (argument or stdin), comma or newline separated
    Add {
        #[arg(long)]
        group: GroupId,
        text: Option<String>,
    },

    /// Stage records from a clipboard payload read from stdin
    Paste {
        #[arg(long)]
        group: GroupId,
        /// Payload carries every field, not only keywords
        #[arg(long)]
        full: bool,
    },

    /// Print a clipboard payload for the given ids (all visible when empty)
    Copy {
        #[arg(long)]
        group: GroupId,
        #[arg(long)]
        full: bool,
        ids: Vec<RecordId>,
    },

    /// Accept every pending keyword
    Accept {
        #[arg(long)]
        group: GroupId,
    },

    /// Reject every pending keyword
    Reject {
        #[arg(long)]
        group: GroupId,
        /// Confirm the hard delete
        #[arg(long)]
        yes: bool,
    },

    /// Move records to trash
    Trash {
        #[arg(long)]
        group: GroupId,
        #[arg(required = true)]
        ids: Vec<RecordId>,
    },

    /// Write (or clear) one editable field on records
    SetField {
        #[arg(long)]
        group: GroupId,
        #[arg(long)]
        field: String,
        /// New value, parsed by the field's type
        #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
        value: Option<String>,
        #[arg(long)]
        clear: bool,
        #[arg(required = true)]
        ids: Vec<RecordId>,
    },

    /// Set the status choice on records
    SetStatus {
        #[arg(long)]
        group: GroupId,
        #[arg(long)]
        status: String,
        #[arg(required = true)]
        ids: Vec<RecordId>,
    },

    /// Restore records from trash
    Restore {
        #[arg(long)]
        group: GroupId,
        #[arg(required = true)]
        ids: Vec<RecordId>,
    },

    /// List trash contents with days left before purge
    TrashList {
        #[arg(long)]
        group: GroupId,
    },

    /// Purge expired trash in every group
    PurgeTrash,

    /// Read or change trash retention
    Retention {
        #[command(subcommand)]
        command: RetentionCommand,
    },

    /// Estimate enrichment cost for the given ids (all visible when empty)
    Estimate {
        #[arg(long)]
        group: GroupId,
        /// SERP depth; defaults to `enrichment.depth`
        #[arg(long)]
        depth: Option<u32>,
        #[arg(long)]
        skip_enriched: bool,
        ids: Vec<RecordId>,
    },

    /// Show the enrichment history of one record
    SerpLog {
        #[arg(long)]
        group: GroupId,
        id: RecordId,
    },
}

#[derive(Subcommand)]
enum CampaignCommand {
    Create { name: String },
    List,
}

#[derive(Subcommand)]
enum GroupCommand {
    Create {
        name: String,
        /// Owning campaign
        #[arg(long)]
        campaign: Option<CampaignId>,
    },
    List {
        /// Only groups of this campaign
        #[arg(long)]
        campaign: Option<CampaignId>,
    },
}

#[derive(Subcommand)]
enum RetentionCommand {
    Get,
    Set { days: u32 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CuratorConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    init_logging(&config.logging).map_err(|err| anyhow!("starting logging: {err}"))?;

    let curator = Curator::open(config).context("opening database")?;
    run(&curator, cli.command).await
}

async fn run(curator: &Curator, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            println!(
                "database ready at {}",
                curator.config().storage.db_path.display()
            );
        }
        Command::Campaign { command } => match command {
            CampaignCommand::Create { name } => {
                let campaign = curator.create_campaign(&name)?;
                println!("{}\t{}", campaign.campaign_id, campaign.name);
            }
            CampaignCommand::List => {
                for campaign in curator.list_campaigns()? {
                    println!(
                        "{}\t{}\t{}",
                        campaign.campaign_id,
                        campaign.name,
                        campaign.status.as_str()
                    );
                }
            }
        },
        Command::Group { command } => match command {
            GroupCommand::Create { name, campaign } => {
                let group = match campaign {
                    Some(campaign_id) => curator.create_group_in(campaign_id, &name)?,
                    None => curator.create_group(&name)?,
                };
                println!("{}\t{}", group.group_id, group.name);
            }
            GroupCommand::List { campaign } => {
                let groups = match campaign {
                    Some(campaign_id) => curator.list_groups_in(campaign_id)?,
                    None => curator.list_groups()?,
                };
                for group in groups {
                    let campaign = group
                        .campaign_id
                        .map_or_else(|| "-".to_string(), |id| id.to_string());
                    println!("{}\t{}\t{}", group.group_id, campaign, group.name);
                }
            }
        },
        Command::Add { group, text } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let outcome = open_group(curator, group)?.add_keywords(&text)?;
            println!("added={} skipped={}", outcome.added.len(), outcome.skipped);
        }
        Command::Paste { group, full } => {
            let outcome = open_group(curator, group)?.paste(&read_stdin()?, copy_mode(full))?;
            println!("added={} skipped={}", outcome.added.len(), outcome.skipped);
        }
        Command::Copy { group, full, ids } => {
            let session = open_group(curator, group)?;
            if ids.is_empty() {
                session.apply_filter_as_selection();
            } else {
                session.select_only(&ids);
            }
            println!("{}", session.copy_selection(copy_mode(full)));
        }
        Command::Accept { group } => {
            let accepted = open_group(curator, group)?.accept_all()?;
            println!("accepted={accepted}");
        }
        Command::Reject { group, yes } => {
            if !yes {
                bail!("reject permanently deletes pending keywords; pass --yes to confirm");
            }
            let rejected = open_group(curator, group)?.reject_all()?;
            println!("rejected={rejected}");
        }
        Command::Trash { group, ids } => {
            run_bulk(curator, group, BulkAction::Delete, ids).await?;
        }
        Command::SetField {
            group,
            field,
            value,
            clear,
            ids,
        } => {
            let session = open_group(curator, group)?;
            let value = if clear {
                None
            } else {
                let spec = session
                    .schema()
                    .spec(&field)
                    .with_context(|| format!("unknown field `{field}`"))?;
                let raw = value.context("--value or --clear is required")?;
                Some(parse_value(spec, &raw)?)
            };
            run_bulk(curator, group, BulkAction::SetField { field, value }, ids).await?;
        }
        Command::SetStatus { group, status, ids } => {
            run_bulk(curator, group, BulkAction::SetStatus { status }, ids).await?;
        }
        Command::Restore { group, ids } => {
            let restored = open_group(curator, group)?.restore(&ids)?;
            println!("restored={restored}");
        }
        Command::TrashList { group } => {
            let horizon = curator.retention_horizon()?;
            for entry in open_group(curator, group)?.trash_entries(now_epoch_ms(), horizon) {
                println!(
                    "{}\t{}\t{}d",
                    entry.record.id, entry.record.keyword, entry.days_remaining
                );
            }
        }
        Command::PurgeTrash => {
            let report = curator.sweep_trash(now_epoch_ms())?;
            println!(
                "purged={} groups={} retention_days={}",
                report.purged, report.groups, report.retention_days
            );
        }
        Command::Retention { command } => match command {
            RetentionCommand::Get => println!("{}", curator.retention_days()?),
            RetentionCommand::Set { days } => {
                curator.set_retention_days(days)?;
                println!("{days}");
            }
        },
        Command::Estimate {
            group,
            depth,
            skip_enriched,
            ids,
        } => {
            let session = open_group(curator, group)?;
            let ids = if ids.is_empty() {
                session.visible_ids()
            } else {
                ids
            };
            let mut params = curator.config().enrichment.params(skip_enriched);
            if let Some(depth) = depth {
                params.depth = depth;
            }
            let settings = curator.config().enrichment.dispatch_settings();
            let estimate = estimate_cost(session.as_ref(), &ids, &params, &settings.cost_model);
            println!(
                "items={} per_item={} total={}",
                estimate.items,
                format_micros(estimate.per_item_micros),
                format_micros(estimate.total_micros)
            );
        }
        Command::SerpLog { group, id } => {
            for log in open_group(curator, group)?.serp_history(id)? {
                let entry = &log.entry;
                let outcome = match &entry.outcome {
                    SerpOutcome::Succeeded => "ok".to_string(),
                    SerpOutcome::Failed(reason) => format!("failed: {reason}"),
                };
                println!(
                    "{}\tdepth={}\tattempts={}\tintent={}\tcost={}\t{}",
                    log.created_at,
                    entry.depth,
                    entry.attempts,
                    entry.intent_type.as_deref().unwrap_or("-"),
                    format_micros(entry.cost_micros),
                    outcome
                );
            }
        }
    }
    Ok(())
}

/// Dispatches a cheap bulk action and prints its event stream.
async fn run_bulk(
    curator: &Curator,
    group: GroupId,
    action: BulkAction,
    ids: Vec<RecordId>,
) -> Result<()> {
    let session = open_group(curator, group)?;
    let mut handle = curator
        .edit_dispatcher()
        .dispatch(session, action, ids)
        .context("starting bulk operation")?;

    while let Some(event) = handle.next_event().await {
        match event {
            DispatchEvent::Progress(progress) => println!(
                "progress {}/{} {}",
                progress.processed, progress.total, progress.current_label
            ),
            DispatchEvent::Complete { summary } => println!(
                "{}: changed={} dropped={} failed={}",
                summary.action.as_str(),
                summary.succeeded_count,
                summary.dropped,
                summary.failed_items.len()
            ),
            DispatchEvent::Error { message } => eprintln!("error: {message}"),
        }
    }
    handle.finish().await?;
    Ok(())
}

fn open_group(curator: &Curator, group: GroupId) -> Result<Arc<SqliteSession>> {
    let session = curator
        .group(group)
        .with_context(|| format!("opening group {group}"))?;
    info!("event=cli_open_group module=cli status=ok group_id={group}");
    Ok(session)
}

fn copy_mode(full: bool) -> CopyMode {
    if full {
        CopyMode::FullRecords
    } else {
        CopyMode::KeywordsOnly
    }
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("reading stdin")?;
    Ok(text)
}
