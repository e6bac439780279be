//! vigild — the Vigil daemon.
//!
//! Assembles the subsystems from a TOML config:
//! - history store (durable log, replayed and compacted on open)
//! - one probe scheduler per configured probe
//! - a tracing-based status receiver
//!
//! # Usage
//!
//! ```text
//! vigild --config vigil.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use vigil_history::{HistoryStore, ProbeStatus};
use vigil_probe::{ProbeScheduler, StatusReceiver, resolve_shell};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil probe monitor daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "vigil.toml")]
    config: PathBuf,
}

/// Logs every recorded status change; notification dispatch plugs in here.
struct LogReceiver;

impl StatusReceiver for LogReceiver {
    fn on_status(&self, status: ProbeStatus, group: &str, name: &str) {
        info!(%status, %group, %name, "probe status recorded");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.log_level.directive())
            }),
        )
        .init();

    info!(name = %config.name, "vigil daemon starting");

    // Store first: recovery and compaction happen before any scheduling.
    let store = HistoryStore::open(config.store.clone())?;

    // Shell resolution happens once; every executor gets the same value.
    let shell = resolve_shell();

    let receiver: Arc<dyn StatusReceiver> = Arc::new(LogReceiver);
    let mut schedulers = Vec::with_capacity(config.probes.len());
    for def in config.probes {
        let scheduler = ProbeScheduler::new(def, shell.clone(), store.clone());
        scheduler.start(Some(Arc::clone(&receiver))).await;
        schedulers.push(scheduler);
    }
    info!(probes = schedulers.len(), "schedulers started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // Schedulers first: the store's writer must not stop while anyone
    // can still submit.
    for scheduler in &schedulers {
        scheduler.close().await;
    }
    store.close().await;

    Ok(())
}
