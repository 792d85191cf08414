//! Due-work scheduler: a fixed-cadence tick loop where every tick claims at
//! most one overdue monitor and runs its check pipeline on its own task.

mod pipeline;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::alerting::EvaluationService;
use crate::checks::Prober;
use crate::db::store::{MonitorStore, StoreError};

pub use pipeline::TickOutcome;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Scheduler task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_concurrent_checks: usize,
    /// How long a claim stays exclusive before another worker may take it over.
    pub claim_lease: Duration,
    pub worker_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            max_concurrent_checks: 16,
            claim_lease: Duration::from_secs(120),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }
}

pub struct MonitorScheduler {
    store: Arc<dyn MonitorStore>,
    prober: Arc<dyn Prober>,
    alerting: Arc<EvaluationService>,
    config: SchedulerConfig,
    capacity: Arc<Semaphore>,
}

impl MonitorScheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn Prober>,
        alerting: Arc<EvaluationService>,
        config: SchedulerConfig,
    ) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_concurrent_checks.max(1)));
        Self {
            store,
            prober,
            alerting,
            config,
            capacity,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starts ticking. Each tick spawns an independent pipeline task and never
    /// waits for earlier ones; a tick with no free capacity is skipped.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;
        let join = tokio::spawn(async move {
            info!(
                worker_id = %scheduler.config.worker_id,
                tick_ms = scheduler.config.tick_interval.as_millis() as u64,
                capacity = scheduler.config.max_concurrent_checks,
                "Monitor scheduler started."
            );
            let mut ticker = tokio::time::interval(scheduler.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Monitor scheduler received shutdown signal.");
                        break;
                    }
                    _ = ticker.tick() => {
                        while let Some(finished) = in_flight.try_join_next() {
                            if let Err(e) = finished {
                                error!(error = %e, "Pipeline task panicked.");
                            }
                        }
                        let Ok(permit) = scheduler.capacity.clone().try_acquire_owned() else {
                            debug!("No free capacity, skipping tick.");
                            continue;
                        };
                        let tick_scheduler = scheduler.clone();
                        in_flight.spawn(async move {
                            let _permit = permit;
                            tick_scheduler.run_tick(Utc::now()).await
                        });
                    }
                }
            }

            let pending = in_flight.len();
            if pending > 0 {
                info!(pending, "Waiting for in-flight checks to finish.");
            }
            while let Some(finished) = in_flight.join_next().await {
                if let Err(e) = finished {
                    error!(error = %e, "Pipeline task panicked.");
                }
            }
            info!("Monitor scheduler stopped.");
        });
        SchedulerHandle { shutdown_tx, join }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops ticking and waits for every in-flight pipeline to finish.
    pub async fn stop(self) -> Result<(), SchedulerError> {
        let _ = self.shutdown_tx.send(true);
        self.join.await?;
        Ok(())
    }
}
