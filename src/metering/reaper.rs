//! Stale batch reaper.
//!
//! A background task that periodically drops open batches which sat under
//! capacity for longer than the stale timeout. Dropped entries are never
//! settled; in-flight batches are never touched.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::core::usage::now_millis;
use crate::error::Result;
use crate::metering::accumulator::{BatchAccumulator, StaleDrop};
use crate::monitoring::metrics::PipelineMetrics;

/// Periodic sweep over the accumulator
pub struct StaleReaper {
    accumulator: Arc<BatchAccumulator>,
    metrics: Arc<PipelineMetrics>,
    stale_timeout_ms: u64,
    sweep_interval: Duration,
    shutdown: Arc<RwLock<bool>>,
}

impl StaleReaper {
    /// Create a reaper
    pub fn new(
        accumulator: Arc<BatchAccumulator>,
        metrics: Arc<PipelineMetrics>,
        stale_timeout_ms: u64,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            accumulator,
            metrics,
            stale_timeout_ms,
            sweep_interval,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Sweep once as of `now` (unix ms)
    pub fn sweep_at(&self, now: u64) -> Result<Vec<StaleDrop>> {
        sweep(&self.accumulator, &self.metrics, now, self.stale_timeout_ms)
    }

    /// Start the background sweep loop
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let accumulator = Arc::clone(&self.accumulator);
        let metrics = Arc::clone(&self.metrics);
        let shutdown = Arc::clone(&self.shutdown);
        let timeout_ms = self.stale_timeout_ms;
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, timeout_ms, "Stale reaper started");

            loop {
                ticker.tick().await;

                if *shutdown.read().await {
                    break;
                }

                if let Err(e) = sweep(&accumulator, &metrics, now_millis(), timeout_ms) {
                    error!(error = %e, "Stale sweep failed");
                }
            }

            info!("Stale reaper stopped");
        })
    }

    /// Ask the loop to exit at its next tick
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}

fn sweep(
    accumulator: &BatchAccumulator,
    metrics: &PipelineMetrics,
    now: u64,
    timeout_ms: u64,
) -> Result<Vec<StaleDrop>> {
    let dropped = accumulator.sweep_at(now, timeout_ms)?;
    for stale in &dropped {
        metrics.record_stale_drop(stale.entries);
        warn!(
            payer = %stale.payer,
            batch = %stale.batch_id.short(),
            entries = stale.entries,
            units = stale.units,
            idle_ms = stale.idle_ms,
            "Dropped stale batch unsettled"
        );
    }
    Ok(dropped)
}
