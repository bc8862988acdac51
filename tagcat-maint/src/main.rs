//! tagcat-maint - Scheduled maintenance for the tagging subsystem
//!
//! Thin CLI over the batch jobs: tag count reconciliation and relationship
//! retirement. Run it from cron or a systemd timer; both jobs are
//! idempotent, so overlapping or repeated invocations are safe.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::{pin_mut, StreamExt};
use tracing::info;

use tagcat_core::counts::CounterStore;
use tagcat_core::discussions::DbDiscussions;
use tagcat_core::retirement::RetirementScanner;

#[derive(Parser)]
#[command(name = "tagcat-maint", about = "Tagging subsystem maintenance jobs")]
struct Cli {
    /// Data folder (falls back to $TAGCAT_DATA, the config file, then the
    /// OS default)
    #[arg(long)]
    data: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Repair denormalized tag usage counters against item tag strings
    Reconcile {
        /// Emit the corrected rows as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Retire stale, unused tag relationships and publish the report
    Retire {
        /// Print the candidates without changing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting tagcat-maint v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let data_folder = tagcat_core::config::resolve_data_folder(cli.data.as_deref())?;
    std::fs::create_dir_all(&data_folder)?;

    let db_path = tagcat_core::config::database_path(&data_folder);
    info!("Database path: {}", db_path.display());

    let pool = tagcat_core::db::init_database(&db_path).await?;
    let settings = tagcat_core::db::load_runtime_settings(&pool).await?;

    match cli.command {
        Command::Reconcile { json } => {
            let counters = CounterStore::new(pool);
            let corrected = counters.reconcile().await?;
            info!("Reconciliation corrected {} tag counts", corrected.len());
            if json {
                println!("{}", serde_json::to_string_pretty(&corrected)?);
            } else {
                for tag in &corrected {
                    info!("  {} -> {}", tag.name, tag.post_count);
                }
            }
        }
        Command::Retire { dry_run } => {
            let discussions = Arc::new(DbDiscussions::new(pool.clone()));
            let scanner = RetirementScanner::new(pool, discussions, &settings);
            if dry_run {
                let candidates = scanner.dry_run();
                pin_mut!(candidates);
                let mut count = 0usize;
                while let Some(notice) = candidates.next().await {
                    println!("{}", notice?);
                    count += 1;
                }
                info!("{} relationships would be retired", count);
            } else {
                scanner.find_and_retire().await?;
            }
        }
    }

    Ok(())
}
