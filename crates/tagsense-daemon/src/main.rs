//! # tagsense-daemon
//!
//! Polls every configured reader on a fixed tick and logs confirmed
//! presence changes.
//!
//! This binary drives every configured reader through
//! [`SimulatedChannel`], which needs no hardware. A deployment with real
//! readers implements `tagsense_core::ReaderChannel` over its protocol driver
//! and builds its own host from the library (`AppState::<MyChannel>::new`,
//! `Poller::new`); nothing else in this crate depends on the channel type.
//!
//! ## Running
//!
//! ```bash
//! # Development, with the simulated readers
//! TAGSENSE_CONFIG=./tagsense.toml cargo run --package tagsense-daemon
//!
//! # Production (JSON logs under logging.directory, default /var/log/tagsense)
//! TAGSENSE_PRODUCTION=1 ./tagsense-daemon
//! ```
//!
//! ## Environment Variables
//!
//! - `TAGSENSE_CONFIG`: configuration file (default: platform config path)
//! - `TAGSENSE_PRODUCTION`: any value other than `0`/`false` enables production logging
//! - `TAGSENSE_LOG_LEVEL` / `RUST_LOG`: log filter
//! - `TAGSENSE__<SECTION>__<KEY>`: configuration overrides

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use tagsense_core::{default_config_path, TagsenseError};
use tagsense_daemon::logging;
use tagsense_daemon::poller::{Poller, Snapshot};
use tagsense_daemon::simulation::SimulatedChannel;
use tagsense_daemon::state::{load_config, startup_hint, AppState};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Environment variable names
mod env_vars {
    pub const CONFIG: &str = "TAGSENSE_CONFIG";
    pub const PRODUCTION: &str = "TAGSENSE_PRODUCTION";
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(env_vars::CONFIG)
        .map_or_else(default_config_path, PathBuf::from);
    let config = load_config(&config_path);
    let logging_config = config
        .as_ref()
        .map(|loaded| loaded.logging.clone())
        .unwrap_or_default();
    logging::init(is_production(), &logging_config)?;
    info!(config = %config_path.display(), "Starting tagsense-daemon");

    let state = config
        .and_then(AppState::<SimulatedChannel>::new)
        .map_err(startup_failed)?
        .into_shared();
    let interval = {
        let guard = state.lock().await;
        if guard.registry.is_empty() {
            warn!("No readers configured; the poll loop will idle");
        }
        Duration::from_millis(guard.config.poll.interval_ms)
    };

    let (poller, snapshots) = Poller::new(state, interval);
    tokio::spawn(report_changes(snapshots));

    let cycles = poller.run(shutdown_signal()).await;
    info!(cycles, "tagsense-daemon stopped");
    Ok(())
}

/// Log a setup failure with its code and an operator hint.
fn startup_failed(err: TagsenseError) -> anyhow::Error {
    error!(
        code = err.error_code(),
        recoverable = err.is_recoverable(),
        hint = startup_hint(&err),
        "Startup failed: {err}"
    );
    err.into()
}

fn is_production() -> bool {
    std::env::var(env_vars::PRODUCTION)
        .map(|value| !matches!(value.as_str(), "" | "0" | "false"))
        .unwrap_or(false)
}

/// Log the aggregate row whenever it differs from the previous one.
async fn report_changes(mut snapshots: watch::Receiver<Snapshot>) {
    let mut last = Vec::new();
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.states != last {
            match serde_json::to_string(&snapshot) {
                Ok(json) => info!(snapshot = %json, "Reader states"),
                Err(e) => warn!("Failed to encode snapshot: {e}"),
            }
            last = snapshot.states;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
