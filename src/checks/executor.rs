use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::ping::{probe_ping, IcmpClients};
use super::tcp::probe_port;
use super::{http::probe_http, ProbeOutcome};
use crate::db::enums::{ErrorCategory, MonitorType};
use crate::db::models::{CheckResult, Monitor, NewCheckResult};
use crate::db::store::{MonitorStore, StoreError};
use crate::version::probe_user_agent;

/// Extra time granted past a monitor's timeout before the probe is abandoned.
pub const PROBE_GRACE: Duration = Duration::from_secs(2);

/// Performs one probe of a monitor. Implementations never fail: every
/// outcome, including internal errors, is expressed as a result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, monitor: &Monitor) -> NewCheckResult;
}

#[derive(Clone)]
pub struct HealthCheckExecutor {
    http: reqwest::Client,
    icmp: IcmpClients,
}

impl HealthCheckExecutor {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_icmp(IcmpClients::open())
    }

    pub fn with_icmp(icmp: IcmpClients) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(probe_user_agent())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { http, icmp })
    }

    async fn run_probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        match monitor.monitor_type {
            MonitorType::Http => probe_http(&self.http, monitor, timeout).await,
            MonitorType::Port => probe_port(&monitor.url, timeout).await,
            MonitorType::Ping => probe_ping(&self.icmp, &monitor.url, timeout).await,
        }
    }
}

#[async_trait]
impl Prober for HealthCheckExecutor {
    #[instrument(skip_all, fields(monitor_id = monitor.id, monitor_type = %monitor.monitor_type))]
    async fn probe(&self, monitor: &Monitor) -> NewCheckResult {
        let checked_at = Utc::now();
        let timeout = monitor.probe_timeout();
        let outcome = match tokio::time::timeout(timeout + PROBE_GRACE, self.run_probe(monitor, timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Probe overran its deadline, abandoning.");
                ProbeOutcome::failed(
                    ErrorCategory::TimeoutError,
                    format!("Timeout Error: no result within {} seconds", timeout.as_secs()),
                    timeout + PROBE_GRACE,
                )
            }
        };
        outcome.into_check(monitor.id, checked_at)
    }
}

/// Probes `monitor` and appends exactly one result to its check log.
#[instrument(skip_all, fields(monitor_id = monitor.id))]
pub async fn execute_check(
    prober: &dyn Prober,
    store: &dyn MonitorStore,
    monitor: &Monitor,
) -> Result<CheckResult, StoreError> {
    let check = prober.probe(monitor).await;
    let recorded = store.record_check(check).await?;
    info!(
        url = %monitor.url,
        is_up = recorded.is_up,
        response_time_ms = recorded.response_time_ms,
        error_category = %recorded.error_category,
        "Check recorded."
    );
    Ok(recorded)
}
