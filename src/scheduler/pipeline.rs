use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, instrument, warn};

use super::{MonitorScheduler, SchedulerError};
use crate::alerting::StatusTransition;
use crate::checks::execute_check;
use crate::db::enums::MonitorStatus;
use crate::db::models::MonitorId;
use crate::db::store::{CheckCompletion, Claim, CompletionOutcome};

/// Result of a single tick, mostly for tests and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,
    /// The claim itself failed; the monitor stays overdue for a later tick.
    ClaimFailed,
    Processed {
        monitor_id: MonitorId,
        /// `None` when the check could not be recorded.
        status: Option<MonitorStatus>,
        /// False when the lease was lost before completion.
        committed: bool,
    },
}

impl MonitorScheduler {
    /// Claims at most one due monitor at `now` and runs its pipeline:
    /// probe, record, alert, then reschedule and release.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let claim = match self
            .store
            .claim_due_monitor(now, self.config.claim_lease, &self.config.worker_id)
            .await
        {
            Ok(Some(claim)) => claim,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "Claim failed, skipping tick.");
                } else {
                    error!(error = %e, "Claim failed, skipping tick.");
                }
                return TickOutcome::ClaimFailed;
            }
        };
        self.process_claim(claim).await
    }

    #[instrument(skip_all, fields(monitor_id = claim.monitor.id, url = %claim.monitor.url))]
    async fn process_claim(&self, claim: Claim) -> TickOutcome {
        let monitor = &claim.monitor;
        // Work past the lease could overlap with a worker that took the monitor over.
        let deadline = Instant::now() + self.lease_budget(&claim);

        let (status, checked_at) = match timeout_at(
            deadline,
            execute_check(self.prober.as_ref(), self.store.as_ref(), monitor),
        )
        .await
        {
            Ok(Ok(check)) => (Some(MonitorStatus::from_probe(check.is_up)), check.checked_at),
            Ok(Err(e)) => {
                error!(error = %e, "Failed to record check, rescheduling only.");
                (None, Utc::now())
            }
            Err(_) => {
                warn!("Check outlived its claim lease, abandoning.");
                (None, Utc::now())
            }
        };

        if let Some(to) = status {
            let transition = StatusTransition {
                from: monitor.status,
                to,
            };
            if transition.is_change() {
                info!(from = %transition.from, to = %transition.to, "Monitor status changed.");
            }
            if timeout_at(deadline, self.alerting.evaluate(monitor, transition, checked_at))
                .await
                .is_err()
            {
                warn!("Alert evaluation outlived the claim lease, remaining configurations skipped.");
            }
        }

        let committed = match self.complete(&claim, status, checked_at).await {
            Ok(committed) => committed,
            Err(e) => {
                error!(error = %e, "Failed to complete claim; the lease will expire.");
                false
            }
        };
        TickOutcome::Processed {
            monitor_id: monitor.id,
            status,
            committed,
        }
    }

    fn lease_budget(&self, claim: &Claim) -> Duration {
        (claim.lease_expires_at - claim.claimed_at)
            .to_std()
            .unwrap_or(self.config.claim_lease)
    }

    async fn complete(
        &self,
        claim: &Claim,
        status: Option<MonitorStatus>,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let outcome = self
            .store
            .complete_claim(claim, CheckCompletion { status, checked_at })
            .await?;
        match outcome {
            CompletionOutcome::Committed(updated) => {
                info!(
                    status = %updated.status,
                    next_check_at = %updated.next_check_at,
                    "Monitor rescheduled."
                );
                Ok(true)
            }
            CompletionOutcome::ClaimLost => {
                warn!(
                    lease_expired_at = %claim.lease_expires_at,
                    "Claim lost before completion, discarding status update."
                );
                Ok(false)
            }
        }
    }
}
