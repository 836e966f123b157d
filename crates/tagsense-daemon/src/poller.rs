//! The control loop: one `poll_all` per tick, then a published snapshot.
//!
//! Each tick takes the state lock, runs a full poll cycle over every reader,
//! and publishes the resulting aggregate row on a watch channel before the
//! lock is released. Subscribers therefore only ever see whole cycles.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tagsense_core::{Classification, ReaderChannel, Transition};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::state::SharedState;

/// Aggregate reader state after a completed poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Completed poll cycles since start.
    pub cycle: u64,
    /// Confirmed classification per reader, indexed by reader ID.
    pub states: Vec<Classification>,
    /// When the cycle completed.
    pub taken_at_utc: DateTime<Utc>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            cycle: 0,
            states: Vec::new(),
            taken_at_utc: Utc::now(),
        }
    }
}

/// Drives the registry on a fixed interval.
pub struct Poller<C> {
    state: SharedState<C>,
    interval: Duration,
    cycles: u64,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl<C: ReaderChannel> Poller<C> {
    /// Create a poller and a receiver for its snapshots.
    #[must_use]
    pub fn new(state: SharedState<C>, interval: Duration) -> (Self, watch::Receiver<Snapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::empty());
        let poller = Self {
            state,
            interval,
            cycles: 0,
            snapshot_tx,
        };
        (poller, snapshot_rx)
    }

    /// Run one poll cycle and publish its snapshot.
    pub async fn tick(&mut self) -> Vec<Transition> {
        let mut guard = self.state.lock().await;
        let transitions = guard.registry.poll_all();
        self.cycles += 1;

        for transition in &transitions {
            if let Ok(event) = serde_json::to_string(transition) {
                debug!(%event, "Transition");
            }
        }

        let snapshot = Snapshot {
            cycle: self.cycles,
            states: guard.registry.snapshot(),
            taken_at_utc: Utc::now(),
        };
        self.snapshot_tx.send_replace(snapshot);
        drop(guard);

        transitions
    }

    /// Poll until `shutdown` resolves. Returns the number of cycles run.
    ///
    /// Ticks missed because a cycle overran are skipped, not replayed.
    pub async fn run<F>(mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_ms = self.interval.as_millis(), "Poll loop started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(cycles = self.cycles, "Poll loop stopped");
        self.cycles
    }
}
