//! Storage seam shared by the scheduler, the executor and the alerting engine.
//!
//! [`MonitorStore`] is implemented by the PostgreSQL store and by the
//! in-memory store used for tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use super::enums::{MonitorStatus, ParseEnumError};
use super::models::{
    AlertConfigId, AlertConfiguration, AlertConfigurationChanges, AlertHistoryEntry, CheckResult,
    Monitor, MonitorChanges, MonitorId, NewAlertConfiguration, NewAlertHistoryEntry,
    NewCheckResult, NewMonitor, Page, PageRequest, TimeRange, ValidationError,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl StoreError {
    /// Whether retrying on the next tick can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }
}

/// Exclusive, time-boxed right to process one monitor for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub monitor: Monitor,
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
}

/// What the scheduler writes back when it releases a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckCompletion {
    /// Raw outcome of the probe; `None` when the pipeline failed before a
    /// result was recorded and the monitor only needs rescheduling.
    pub status: Option<MonitorStatus>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Committed(Monitor),
    /// The lease expired and was taken over, or the monitor was deleted.
    ClaimLost,
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    // --- scheduling ---

    /// Claims the most overdue non-paused monitor that has no live lease.
    /// Never waits on rows held by other workers.
    async fn claim_due_monitor(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Claim>, StoreError>;

    /// Persists the new status fields, sets `next_check_at = claimed_at + interval`
    /// (unless the config was edited after the claim) and releases the lease.
    async fn complete_claim(
        &self,
        claim: &Claim,
        completion: CheckCompletion,
    ) -> Result<CompletionOutcome, StoreError>;

    // --- check log ---

    async fn record_check(&self, check: NewCheckResult) -> Result<CheckResult, StoreError>;

    /// Most recent results first.
    async fn recent_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError>;

    async fn checks_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<CheckResult>, StoreError>;

    // --- alerting ---

    async fn enabled_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError>;

    async fn latest_alert_for_config(
        &self,
        monitor_id: MonitorId,
        alert_config_id: AlertConfigId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError>;

    async fn record_alert(
        &self,
        entry: NewAlertHistoryEntry,
    ) -> Result<AlertHistoryEntry, StoreError>;

    async fn alert_history_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<AlertHistoryEntry>, StoreError>;

    // --- owner-driven configuration ---

    /// New monitors start UNKNOWN and are due immediately.
    async fn create_monitor(
        &self,
        monitor: NewMonitor,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError>;

    /// Applies config changes and reschedules to `now + interval`.
    async fn update_monitor(
        &self,
        monitor_id: MonitorId,
        changes: MonitorChanges,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError>;

    /// Pausing sets PAUSED; resuming resets to UNKNOWN and makes the monitor due at `now`.
    async fn set_monitor_paused(
        &self,
        monitor_id: MonitorId,
        paused: bool,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError>;

    /// Removes the monitor with its checks, alert configurations and history.
    async fn delete_monitor(&self, monitor_id: MonitorId) -> Result<bool, StoreError>;

    async fn get_monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StoreError>;

    async fn list_monitors_for_user(&self, user_id: i64) -> Result<Vec<Monitor>, StoreError>;

    async fn create_alert_config(
        &self,
        config: NewAlertConfiguration,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError>;

    async fn update_alert_config(
        &self,
        alert_config_id: AlertConfigId,
        changes: AlertConfigurationChanges,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError>;

    async fn delete_alert_config(&self, alert_config_id: AlertConfigId)
        -> Result<bool, StoreError>;

    async fn list_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError>;
}

pub(crate) fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(5));
    now + lease
}
