//! Lifeledger main entry point

use clap::{Parser, Subcommand};
use lifeledger_cache::{CacheRef, JsonFileCache};
use lifeledger_config::Config;
use lifeledger_core::Ledger;
use lifeledger_sync::{run_local_only, ConnectivityMonitor, MemoryRemoteStore, SyncEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "lifeledger")]
#[command(version = "0.1.0")]
#[command(about = "Offline-first personal finance ledger", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print ledger collection counts and the total balance
    Status,
    /// Export the full ledger to a backup file
    Export {
        /// Backup file path
        output: PathBuf,
    },
    /// Replace the full ledger with a backup file
    Import {
        /// Backup file path
        input: PathBuf,
    },
    /// Verify derived balances and repair any drift
    Repair,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // No config file is a valid local-only setup
    let (config, load_error) = match Config::load(args.config.clone()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Some(e) = load_error {
        log::debug!("Using default configuration: {}", e);
    }

    let rt = Runtime::new()?;
    rt.block_on(run(config, args.command))
}

async fn run(config: Config, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let cache: CacheRef = Arc::new(JsonFileCache::new(config.data.path.clone()));
    let ledger = Arc::new(Ledger::new(cache.clone()));
    ledger.load_from_cache().await?;

    let intents = ledger
        .intent_receiver()
        .expect("intent receiver is taken exactly once at startup");

    // Without an authenticated session the ledger runs local-only; the
    // in-memory remote store stands in for a real backend otherwise.
    // The monitor owns the connectivity channel and must outlive the
    // engine's run loop, which stops when its subscription closes.
    let (_sync_task, _connectivity) = match &config.session.user_id {
        Some(user_id) => {
            let monitor = ConnectivityMonitor::new(true);
            let engine = Arc::new(SyncEngine::new(
                ledger.clone(),
                Arc::new(MemoryRemoteStore::new()),
                cache,
                monitor.subscribe(),
                user_id.clone(),
                config.sync.clone(),
            ));
            engine.load_pending().await?;
            (tokio::spawn(engine.run(intents)), Some(monitor))
        }
        None => (tokio::spawn(run_local_only(intents)), None),
    };

    match command {
        Command::Status => {
            let summary = ledger.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Export { output } => {
            let document = serde_json::to_vec_pretty(&ledger.export_backup())?;
            tokio::fs::write(&output, document).await?;
            println!("Exported ledger to {}", output.display());
        }
        Command::Import { input } => {
            let raw = tokio::fs::read(&input).await?;
            let document: serde_json::Value = serde_json::from_slice(&raw)?;
            let report = ledger.import_backup(&document).await?;
            println!(
                "Imported {} records ({} skipped)",
                report.imported,
                report.skipped.len()
            );
            for skipped in &report.skipped {
                log::warn!(
                    "Skipped {} record at index {}: {}",
                    skipped.kind,
                    skipped.index,
                    skipped.reason
                );
            }
        }
        Command::Repair => {
            let report = ledger.verify_and_repair().await;
            if report.drifted.is_empty() {
                println!("All balances consistent");
            } else {
                println!("Repaired {} drifted balances", report.drifted.len());
                for drift in &report.drifted {
                    println!(
                        "  {}: {} -> {}",
                        drift.method_id, drift.stored, drift.recomputed
                    );
                }
            }
        }
    }

    Ok(())
}
