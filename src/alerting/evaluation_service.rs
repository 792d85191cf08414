use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::confirmation::{fetch_size, is_throttled, outage_confirmed, recovery_confirmed};
use crate::db::enums::{AlertOutcome, ErrorCategory, MonitorStatus};
use crate::db::models::{AlertConfiguration, CheckResult, Monitor, NewAlertHistoryEntry};
use crate::db::store::{MonitorStore, StoreError};
use crate::notifications::NotificationRegistry;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Status before and after the check that triggered an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: MonitorStatus,
    pub to: MonitorStatus,
}

impl StatusTransition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    Recovery,
}

/// What happened for one configuration that reached a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertReport {
    pub alert_config_id: i64,
    pub kind: AlertKind,
    /// `None` when no handler is registered for the alert type.
    pub outcome: Option<AlertOutcome>,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertingSettings {
    pub throttle_window: ChronoDuration,
    pub send_timeout: Duration,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            throttle_window: ChronoDuration::minutes(60),
            send_timeout: Duration::from_secs(10),
        }
    }
}

pub struct EvaluationService {
    store: Arc<dyn MonitorStore>,
    registry: Arc<NotificationRegistry>,
    settings: AlertingSettings,
}

pub fn down_message(monitor: &Monitor, latest: Option<&CheckResult>) -> String {
    let mut message = format!("Monitor {} is DOWN!", monitor.url);
    if let Some(check) = latest.filter(|c| c.error_category != ErrorCategory::None) {
        message.push_str(&format!(" [{}]", check.error_category));
        if let Some(detail) = check.error_message.as_deref() {
            message.push(' ');
            message.push_str(detail);
        }
    }
    message
}

pub fn recovery_message(monitor: &Monitor) -> String {
    format!("Monitor {} is UP again!", monitor.url)
}

impl EvaluationService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        registry: Arc<NotificationRegistry>,
        settings: AlertingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Runs every enabled configuration of `monitor` against the latest check.
    /// Failures are logged per configuration and never escape.
    #[instrument(skip_all, fields(monitor_id = monitor.id, from = %transition.from, to = %transition.to))]
    pub async fn evaluate(
        &self,
        monitor: &Monitor,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Vec<AlertReport> {
        let kind = match transition.to {
            MonitorStatus::Down => AlertKind::Down,
            MonitorStatus::Up => AlertKind::Recovery,
            _ => return Vec::new(),
        };

        let configs = match self.store.enabled_alert_configs(monitor.id).await {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to load alert configurations.");
                return Vec::new();
            }
        };
        let required: Vec<(AlertConfiguration, usize)> = configs
            .into_iter()
            .filter_map(|config| {
                let required = match kind {
                    AlertKind::Down => Some(config.failure_threshold()),
                    AlertKind::Recovery => config.recovery_threshold(),
                }?;
                Some((config, required))
            })
            .collect();
        let Some(window) = required.iter().map(|(_, n)| fetch_size(*n)).max() else {
            return Vec::new();
        };

        let recent = match self.store.recent_checks(monitor.id, window).await {
            Ok(recent) => recent,
            Err(e) => {
                error!(error = %e, "Failed to load recent checks.");
                return Vec::new();
            }
        };
        let flags: Vec<bool> = recent.iter().map(|c| c.is_up).collect();

        let mut reports = Vec::new();
        for (config, required) in required {
            let slice = &flags[..flags.len().min(fetch_size(required))];
            let confirmed = match kind {
                AlertKind::Down => outage_confirmed(slice, required),
                AlertKind::Recovery => recovery_confirmed(slice, required),
            };
            if !confirmed {
                continue;
            }
            info!(alert_config_id = config.id, ?kind, "Alert confirmed.");

            let message = match kind {
                AlertKind::Down => down_message(monitor, recent.first()),
                AlertKind::Recovery => recovery_message(monitor),
            };
            match self.dispatch(monitor, &config, &message, now).await {
                Ok(outcome) => reports.push(AlertReport {
                    alert_config_id: config.id,
                    kind,
                    outcome,
                }),
                Err(e) => error!(
                    alert_config_id = config.id,
                    error = %e,
                    "Failed to process alert configuration."
                ),
            }
        }
        reports
    }

    async fn dispatch(
        &self,
        monitor: &Monitor,
        config: &AlertConfiguration,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertOutcome>, EvaluationError> {
        let latest = self
            .store
            .latest_alert_for_config(monitor.id, config.id)
            .await?;
        if is_throttled(latest.as_ref(), now, self.settings.throttle_window) {
            info!(alert_config_id = config.id, alert_type = %config.alert_type, "Throttling alert.");
            self.record(monitor, config, format!("{message} (throttled)"), AlertOutcome::Throttled, None, now)
                .await?;
            return Ok(Some(AlertOutcome::Throttled));
        }

        let Some(handler) = self.registry.get(config.alert_type) else {
            warn!(alert_type = %config.alert_type, "No handler registered for alert type.");
            return Ok(None);
        };

        let sent = tokio::time::timeout(
            self.settings.send_timeout,
            handler.send(&config.destination, message),
        )
        .await;
        let failure = match sent {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "send timed out after {} seconds",
                self.settings.send_timeout.as_secs()
            )),
        };

        match failure {
            None => {
                info!(alert_config_id = config.id, alert_type = %config.alert_type, "Alert sent.");
                self.record(monitor, config, message.to_string(), AlertOutcome::Sent, None, now)
                    .await?;
                Ok(Some(AlertOutcome::Sent))
            }
            Some(reason) => {
                error!(
                    alert_config_id = config.id,
                    alert_type = %config.alert_type,
                    error = %reason,
                    "Failed to send alert."
                );
                self.record(
                    monitor,
                    config,
                    format!("{message} (failed: {reason})"),
                    AlertOutcome::Failed,
                    Some(reason),
                    now,
                )
                .await?;
                Ok(Some(AlertOutcome::Failed))
            }
        }
    }

    async fn record(
        &self,
        monitor: &Monitor,
        config: &AlertConfiguration,
        message: String,
        outcome: AlertOutcome,
        failure_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EvaluationError> {
        self.store
            .record_alert(NewAlertHistoryEntry {
                monitor_id: monitor.id,
                alert_config_id: Some(config.id),
                recorded_at: now,
                message,
                outcome,
                failure_reason,
            })
            .await?;
        Ok(())
    }
}
