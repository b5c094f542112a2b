//! # Poolwatch CLI (`poolwatch`)
//!
//! Thin command-line front end over the ingestion engine.
//!
//! ## Usage
//!
//! ```bash
//! poolwatch --config ./config/poolwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `poolwatch init` | Create the SQLite database and load configured sources |
//! | `poolwatch sources` | List sources with health and last-run status |
//! | `poolwatch sync <source>` | Run one source (`--type backfill\|incremental\|resume`) |
//! | `poolwatch sync-all` | Run every active source in turn |
//!
//! Every command except `init` re-synchronizes the `[[sources]]` table from
//! the config file first, so edits take effect without re-running `init`.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use poolwatch::config::{self, Config};
use poolwatch::ingest::{run_all_active, run_ingestion};
use poolwatch::registry::Registry;
use poolwatch::sources::{check_sources, sync_config, SourceStatus};
use poolwatch::sqlite_store::SqliteStore;
use poolwatch::{db, logging, migrate};
use poolwatch_core::models::{IngestionOptions, IngestionResult, SyncType};

/// Poolwatch: resumable ingestion of pool and spa inspection records.
#[derive(Parser)]
#[command(name = "poolwatch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/poolwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and load configured sources.
    ///
    /// Idempotent: safe to run again after editing the config.
    Init,

    /// Show every source with its health check and last run.
    Sources,

    /// Run ingestion for one source.
    Sync {
        /// Source id from the config file.
        source: String,

        /// backfill, incremental, or resume.
        #[arg(long = "type", default_value = "incremental", value_parser = parse_sync_type)]
        sync_type: SyncType,

        /// Stop after the batch that reaches this many fetched records.
        #[arg(long)]
        max_records: Option<u64>,
    },

    /// Run every active source, one after another.
    SyncAll {
        #[arg(long = "type", default_value = "incremental", value_parser = parse_sync_type)]
        sync_type: SyncType,
    },
}

fn parse_sync_type(s: &str) -> Result<SyncType, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let store = open_store(&cfg).await?;
            let summary = sync_config(&store, &cfg).await?;
            println!(
                "Database initialized: {} jurisdiction(s), {} source(s).",
                summary.jurisdictions, summary.sources
            );
        }
        Commands::Sources => {
            let store = open_store(&cfg).await?;
            sync_config(&store, &cfg).await?;
            let registry = Registry::with_builtins(cfg.retry.policy());
            print_statuses(&check_sources(&store, &registry).await?);
        }
        Commands::Sync {
            source,
            sync_type,
            max_records,
        } => {
            let store = open_store(&cfg).await?;
            sync_config(&store, &cfg).await?;
            let registry = Registry::with_builtins(cfg.retry.policy());
            let options = IngestionOptions {
                source_id: source.clone(),
                sync_type,
                max_records,
            };
            let result = run_ingestion(&store, &registry, &options).await?;
            print_results(&[(source, result.clone())]);
            if !result.success {
                bail!("sync failed");
            }
        }
        Commands::SyncAll { sync_type } => {
            let store = open_store(&cfg).await?;
            sync_config(&store, &cfg).await?;
            let registry = Registry::with_builtins(cfg.retry.policy());
            let results = run_all_active(&store, &registry, sync_type).await?;
            print_results(&results);
            let failed = results.iter().filter(|(_, r)| !r.success).count();
            if failed > 0 {
                bail!("{} of {} source(s) failed", failed, results.len());
            }
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(cfg).await?))
}

fn print_statuses(statuses: &[SourceStatus]) {
    println!(
        "{:<24} {:<14} {:<8} {:<8} {:<9} LAST SYNC",
        "SOURCE", "JURISDICTION", "TYPE", "ACTIVE", "HEALTHY"
    );
    for s in statuses {
        let healthy = match s.healthy {
            Some(true) => "yes",
            Some(false) => "NO",
            None => "-",
        };
        let last = match (s.last_sync_at, s.last_sync_status) {
            (Some(at), Some(status)) => format!("{} {}", at.format("%Y-%m-%d %H:%M"), status),
            _ => "never".to_string(),
        };
        println!(
            "{:<24} {:<14} {:<8} {:<8} {:<9} {}",
            s.id,
            s.jurisdiction,
            s.adapter_type.as_str(),
            s.is_active,
            healthy,
            last
        );
        if let Some(err) = &s.error {
            println!("    {}", err);
        }
    }
}

fn print_results(results: &[(String, IngestionResult)]) {
    for (id, r) in results {
        println!(
            "{}: {} fetched, {} created, {} updated, {} skipped, {} failed",
            id,
            r.records_fetched,
            r.records_created,
            r.records_updated,
            r.records_skipped,
            r.records_failed
        );
        if let Some(err) = &r.error {
            println!("    error: {}", err);
        }
    }
}
