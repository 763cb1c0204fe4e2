//! Periodic and on-demand graph maintenance.
//!
//! A maintenance run recomputes communities, refreshes influence for the
//! top PageRank nodes, prunes stale weak edges, drops the path cache and
//! persists a snapshot.
//!
//! ## Design
//!
//! Uses an mpsc channel + interval loop:
//! 1. `trigger()` sends a non-blocking message
//! 2. The background task waits for the interval tick or a trigger; after a
//!    trigger it keeps consuming triggers until `debounce_ms` of silence
//! 3. Runs are sequential, never two at once
//! 4. `shutdown()` cancels the loop and waits for it to exit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::GraphEngine;
use crate::graph::GraphError;

/// Maintenance schedule and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between scheduled runs (default: 300)
    pub interval_secs: u64,
    /// Quiet period after an explicit trigger (default: 2000)
    pub debounce_ms: u64,
    /// Timestamped edges older than this many days may be pruned (default: 30)
    pub prune_after_days: i64,
    /// Only edges lighter than this are pruned (default: 0.5)
    pub prune_min_weight: f64,
    /// Influence is refreshed for this many top PageRank nodes (default: 100)
    pub influence_top_k: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            debounce_ms: 2000,
            prune_after_days: 30,
            prune_min_weight: 0.5,
            influence_top_k: 100,
        }
    }
}

impl MaintenanceConfig {
    /// Timestamp before which light edges are pruned, `prune_after_days`
    /// before `now`.
    pub fn prune_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, GraphError> {
        chrono::Duration::try_days(self.prune_after_days)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| {
                GraphError::InvalidConfig(format!(
                    "prune_after_days {} is out of range",
                    self.prune_after_days
                ))
            })
    }
}

/// Summary of one maintenance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub communities: usize,
    pub influence_refreshed: usize,
    pub pruned_edges: usize,
    pub snapshot_saved: bool,
}

/// Handle to the background maintenance loop.
pub struct MaintenanceScheduler {
    trigger_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop. The first scheduled run happens one full
    /// interval after start.
    pub fn start(engine: Arc<GraphEngine>, config: MaintenanceConfig) -> Self {
        let (tx, rx) = mpsc::channel::<()>(64);
        let cancel = engine.shutdown_token().child_token();
        let handle = tokio::spawn(Self::run_loop(engine, config, rx, cancel.clone()));
        Self {
            trigger_tx: tx,
            cancel,
            handle,
        }
    }

    /// Request a run soon.
    ///
    /// Non-blocking: if the channel is full the trigger is dropped (a pending
    /// one will still fire).
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Stop the loop and wait for an in-progress run to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Maintenance loop ended abnormally: {}", e);
        }
    }

    async fn run_loop(
        engine: Arc<GraphEngine>,
        config: MaintenanceConfig,
        mut rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        let debounce = Duration::from_millis(config.debounce_ms);
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
                msg = rx.recv() => {
                    if msg.is_none() {
                        break; // channel closed, scheduler dropped
                    }
                    // Debounce: keep consuming triggers until quiet period
                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            next = tokio::time::timeout(debounce, rx.recv()) => match next {
                                Ok(Some(())) => continue,
                                Ok(None) => return,
                                Err(_) => break,
                            },
                        }
                    }
                }
            }

            match engine.run_maintenance(&config).await {
                Ok(report) => {
                    tracing::info!(
                        "Maintenance run {} finished in {}ms ({} communities, {} influence refreshed, {} edges pruned, saved: {})",
                        report.run_id,
                        report.duration_ms,
                        report.communities,
                        report.influence_refreshed,
                        report.pruned_edges,
                        report.snapshot_saved,
                    );
                }
                Err(e) => {
                    tracing::warn!("Maintenance run failed: {}", e);
                }
            }
            interval.reset();
        }
        tracing::debug!("Maintenance loop stopped");
    }
}
