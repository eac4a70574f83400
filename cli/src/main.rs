//! chainpoll CLI: validate job files and manage persisted cursors.
//!
//! # Commands
//! ```bash
//! chainpoll validate jobs.json
//! chainpoll cursor get   ./cursors wormhole-eth
//! chainpoll cursor reset ./cursors wormhole-eth
//! chainpoll info
//! ```

mod logging;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use chainpoll_chains::registry::resolve_job;
use chainpoll_core::config::{JobsFile, Tunables, NEAR_HEAD_TOLERANCE_ENV, SOLANA_SLOT_SEARCH_LIMIT_ENV};
use chainpoll_core::store::CursorStore;
use chainpoll_storage::FileCursorStore;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "chainpoll",
    about = "Incremental polling engine for cross-chain bridge events",
    long_about = "
ChainPoll CLI: validate job files and inspect or reset file-backed cursors.

ENVIRONMENT VARIABLES:
  CHAINPOLL_LOG                       level[,crate=level...] (default: info)
  CHAINPOLL_LOG_JSON                  1 for JSON log lines
  CHAINPOLL_NEAR_HEAD_TOLERANCE       Near head lag tolerance in blocks
  CHAINPOLL_SOLANA_SLOT_SEARCH_LIMIT  Slots searched per Solana window bound
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a jobs file
    Validate {
        /// Path to the jobs file (`{ "jobs": [...] }`)
        path: PathBuf,
    },

    /// Inspect or reset a file-backed cursor
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },

    /// Show defaults and supported chains
    Info,
}

#[derive(Subcommand)]
enum CursorAction {
    /// Show the stored cursor record of a job
    Get {
        /// Cursor directory
        dir: PathBuf,
        job_id: String,
    },
    /// Delete the stored cursor of a job
    Reset {
        /// Cursor directory
        dir: PathBuf,
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig::from_env());

    match cli.command {
        Commands::Validate { path } => cmd_validate(&path),
        Commands::Cursor { action } => match action {
            CursorAction::Get { dir, job_id } => cmd_cursor_get(&dir, &job_id).await,
            CursorAction::Reset { dir, job_id } => cmd_cursor_reset(&dir, &job_id).await,
        },
        Commands::Info => cmd_info(),
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let file = JobsFile::load(path)?;
    let tunables = Tunables::from_env()?;
    info!(path = %path.display(), jobs = file.jobs.len(), "jobs file loaded");

    let mut failed = 0;
    for job in &file.jobs {
        match resolve_job(job) {
            Ok(kind) => println!(
                "  {:<24} {:<10} {:<22} from={:<12} to={:<12} batch={:<6} every {}ms",
                job.id(),
                job.chain(),
                kind,
                job.from().map_or("-".into(), |v| v.to_string()),
                job.to().map_or("-".into(), |v| v.to_string()),
                job.batch_size(),
                job.poll_interval().as_millis(),
            ),
            Err(e) => {
                failed += 1;
                println!("  {:<24} INVALID: {e}", job.id());
            }
        }
    }
    println!(
        "\n{} job(s), {} invalid; near head tolerance {}, solana slot search limit {}",
        file.jobs.len(),
        failed,
        tunables.near_head_tolerance,
        tunables.solana_slot_search_limit,
    );
    if failed > 0 {
        bail!("{failed} job(s) cannot be started");
    }
    Ok(())
}

async fn cmd_cursor_get(dir: &Path, job: &str) -> Result<()> {
    let store = FileCursorStore::open(dir).await?;
    match store.record(job).await? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("no cursor for job `{job}` in {}", store.dir().display()),
    }
    Ok(())
}

async fn cmd_cursor_reset(dir: &Path, job: &str) -> Result<()> {
    let store = FileCursorStore::open(dir).await?;
    let previous = store.get(job).await?;
    store.delete(job).await?;
    match previous {
        Some(cursor) => println!("deleted cursor for `{job}` (was {:?})", cursor),
        None => println!("no cursor for job `{job}`; nothing to do"),
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = Tunables::default();
    println!("ChainPoll v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default batch size: {}", chainpoll_core::config::DEFAULT_BATCH_SIZE);
    println!("  Default poll interval: {}ms", chainpoll_core::config::DEFAULT_POLL_INTERVAL_MS);
    println!("  RPC retry: 10 attempts, exponential backoff, 5s cooldown on rate limits");
    println!(
        "  Near head tolerance: {} blocks (${NEAR_HEAD_TOLERANCE_ENV})",
        defaults.near_head_tolerance
    );
    println!(
        "  Solana slot search limit: {} slots (${SOLANA_SLOT_SEARCH_LIMIT_ENV})",
        defaults.solana_slot_search_limit
    );
    println!("  Storage backends: memory, JSON files, SQLite (feature: sqlite)");
    println!("  Chains:");
    for chain in chainpoll_core::config::Chain::ALL {
        let strategies: Vec<&str> = chain.strategies().iter().map(|s| s.as_str()).collect();
        println!("    {:<10} {:?} cursor, {}", chain.as_str(), chain.family(), strategies.join("/"));
    }
    Ok(())
}
