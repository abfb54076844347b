//! Periodic eviction of stale rate-limit buckets and CSRF records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use agencyportal_auth::Sweep;

/// Runs every registered [`Sweep`] on a fixed interval.
pub struct Sweeper {
    interval: Duration,
    targets: Vec<Arc<dyn Sweep>>,
}

impl Sweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            targets: Vec::new(),
        }
    }

    pub fn with(mut self, target: Arc<dyn Sweep>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// One pass over every target; returns the total number of evictions.
    pub fn run_once(&self, now: DateTime<Utc>) -> usize {
        let mut total = 0;
        for target in &self.targets {
            let evicted = target.sweep(now);
            if evicted > 0 {
                tracing::debug!(store = target.name(), evicted, "swept stale entries");
            }
            total += evicted;
        }
        total
    }

    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                stores = self.targets.len(),
                "sweeper started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!("sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once(Utc::now());
                    }
                }
            }
        });

        SweeperHandle { shutdown, join }
    }
}

/// Handle to stop and join a spawned [`Sweeper`].
pub struct SweeperHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Request shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        // notify_one stores a permit, so a signal sent before the loop
        // first polls `notified()` is not lost.
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}
