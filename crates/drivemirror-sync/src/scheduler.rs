//! Reconciliation scheduler
//!
//! Runs [`ReconciliationEngine::reconcile`] on a fixed interval. The first
//! cycle starts immediately. Each cycle runs in its own task, so a panic
//! inside it is caught and logged and the timer keeps going.
//!
//! ## Flow
//!
//! ```text
//! interval tick ──→ spawn(reconcile) ──→ log CycleReport / error
//!       ▲                                       │
//!       └───────────── next tick ◄──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::reconcile::ReconciliationEngine;

/// `tokio::time::interval` rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drives reconciliation cycles on a timer
pub struct ReconcileScheduler {
    engine: Arc<ReconciliationEngine>,
    interval: Duration,
}

impl ReconcileScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, interval: Duration) -> Self {
        info!(interval_secs = interval.as_secs(), "Creating reconcile scheduler");
        Self {
            engine,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Runs cycles until `cancel` fires
    ///
    /// Cancellation stops the timer; a cycle already running is awaited.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // A cycle that overruns the interval delays the next one instead of
        // triggering a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            cycles += 1;
            let engine = self.engine.clone();
            let cycle = tokio::spawn(async move { engine.reconcile().await });

            match cycle.await {
                Ok(Ok(report)) => {
                    if !report.is_noop() {
                        info!(cycle = cycles, %report, "Cycle changed the local folder");
                    }
                }
                Ok(Err(e)) if e.is_auth() => {
                    error!(cycle = cycles, error = %e, "Cycle failed: credentials rejected");
                }
                Ok(Err(e)) => warn!(cycle = cycles, error = %e, "Cycle skipped"),
                Err(join) => error!(cycle = cycles, error = %join, "Cycle panicked"),
            }
        }
        info!(cycles, "Reconcile scheduler stopped");
    }
}
