//! Drives autonomy cycles on a fixed interval until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::autonomy::{AutonomyEngine, CycleReport};

pub struct CycleScheduler {
    engine: Arc<AutonomyEngine>,
    interval: Duration,
    first_delay: Duration,
    grace: Duration,
    cancel: CancellationToken,
}

impl CycleScheduler {
    pub fn new(engine: Arc<AutonomyEngine>, cancel: CancellationToken) -> Self {
        let config = engine.config();
        Self {
            interval: config.cycle_interval,
            first_delay: config.first_cycle_delay,
            grace: config.shutdown_grace,
            engine,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until cancelled. A tick that lands while a cycle is still running
    /// is skipped. On cancellation the in-flight cycle gets the grace period
    /// to finish.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            first_delay_secs = self.first_delay.as_secs(),
            "autonomy scheduler started"
        );
        let mut ticker = interval_at(Instant::now() + self.first_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<JoinHandle<Option<CycleReport>>> = None;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                        warn!("cycle overrun: previous cycle still running, skipping tick");
                        continue;
                    }
                    let engine = self.engine.clone();
                    in_flight = Some(tokio::spawn(async move { engine.run_cycle().await }));
                }
            }
        }

        if let Some(mut handle) = in_flight.filter(|h| !h.is_finished()) {
            info!(grace_secs = self.grace.as_secs(), "waiting for in-flight cycle");
            if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
                warn!("in-flight cycle exceeded shutdown grace, aborting it");
                handle.abort();
            }
        }
        info!("autonomy scheduler stopped");
    }
}
