//! In-process implementation of [`MonitorStore`].
//!
//! All state sits behind one mutex, so a claim is a single atomic
//! check-and-set. Used by the test suite and by the server when no
//! `DATABASE_URL` is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::db::enums::MonitorStatus;
use crate::db::models::{
    AlertConfigId, AlertConfiguration, AlertConfigurationChanges, AlertHistoryEntry, CheckResult,
    Monitor, MonitorChanges, MonitorId, NewAlertConfiguration, NewAlertHistoryEntry,
    NewCheckResult, NewMonitor, Page, PageRequest, TimeRange, DEFAULT_TIMEOUT_SECONDS,
};
use crate::db::store::{
    lease_deadline, CheckCompletion, Claim, CompletionOutcome, MonitorStore, StoreError,
};

#[derive(Debug, Clone)]
struct Lease {
    worker_id: String,
    claimed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct MonitorRecord {
    monitor: Monitor,
    lease: Option<Lease>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    monitors: BTreeMap<MonitorId, MonitorRecord>,
    checks: Vec<CheckResult>,
    alert_configs: BTreeMap<AlertConfigId, AlertConfiguration>,
    alert_history: Vec<AlertHistoryEntry>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record_mut(&mut self, monitor_id: MonitorId) -> Result<&mut MonitorRecord, StoreError> {
        self.monitors
            .get_mut(&monitor_id)
            .ok_or_else(|| StoreError::NotFound(format!("monitor {monitor_id}")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: overrides a monitor's schedule and status directly.
    pub async fn force_schedule(
        &self,
        monitor_id: MonitorId,
        next_check_at: DateTime<Utc>,
        status: MonitorStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(monitor_id)?;
        record.monitor.next_check_at = next_check_at;
        record.monitor.status = status;
        Ok(())
    }

    pub async fn check_count(&self, monitor_id: MonitorId) -> usize {
        let state = self.state.lock().await;
        state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id)
            .count()
    }

    pub async fn alert_history(&self, monitor_id: MonitorId) -> Vec<AlertHistoryEntry> {
        let state = self.state.lock().await;
        state
            .alert_history
            .iter()
            .filter(|e| e.monitor_id == monitor_id)
            .cloned()
            .collect()
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let offset = page.offset().min(total) as usize;
    let items: Vec<T> = rows
        .drain(offset..)
        .take(page.size as usize)
        .collect();
    Page {
        items,
        page: page.page,
        size: page.size,
        total,
    }
}

#[async_trait]
impl MonitorStore for InMemoryStore {
    async fn claim_due_monitor(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Claim>, StoreError> {
        let mut state = self.state.lock().await;
        let candidate = state
            .monitors
            .values()
            .filter(|r| r.monitor.next_check_at < now)
            .filter(|r| r.monitor.status != MonitorStatus::Paused)
            .filter(|r| r.lease.as_ref().map_or(true, |l| l.expires_at <= now))
            .min_by_key(|r| (r.monitor.next_check_at, r.monitor.id))
            .map(|r| r.monitor.id);

        let Some(monitor_id) = candidate else {
            return Ok(None);
        };

        let expires_at = lease_deadline(now, lease);
        let record = state.record_mut(monitor_id)?;
        record.lease = Some(Lease {
            worker_id: worker_id.to_string(),
            claimed_at: now,
            expires_at,
        });
        Ok(Some(Claim {
            monitor: record.monitor.clone(),
            worker_id: worker_id.to_string(),
            claimed_at: now,
            lease_expires_at: expires_at,
        }))
    }

    async fn complete_claim(
        &self,
        claim: &Claim,
        completion: CheckCompletion,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.monitors.get_mut(&claim.monitor.id) else {
            return Ok(CompletionOutcome::ClaimLost);
        };
        let holds_claim = record
            .lease
            .as_ref()
            .is_some_and(|l| l.worker_id == claim.worker_id && l.claimed_at == claim.claimed_at);
        if !holds_claim {
            return Ok(CompletionOutcome::ClaimLost);
        }

        let monitor = &mut record.monitor;
        if let Some(status) = completion.status {
            monitor.last_checked_at = Some(completion.checked_at);
            if monitor.status != MonitorStatus::Paused && monitor.status != status {
                monitor.status = status;
                monitor.last_status_change_at = Some(completion.checked_at);
            }
        }
        if monitor.updated_at <= claim.claimed_at {
            monitor.next_check_at = claim.claimed_at + monitor.interval();
        }
        record.lease = None;
        Ok(CompletionOutcome::Committed(record.monitor.clone()))
    }

    async fn record_check(&self, check: NewCheckResult) -> Result<CheckResult, StoreError> {
        let mut state = self.state.lock().await;
        if !state.monitors.contains_key(&check.monitor_id) {
            return Err(StoreError::NotFound(format!("monitor {}", check.monitor_id)));
        }
        let id = state.allocate_id();
        let row = CheckResult::from_new(id, check);
        state.checks.push(row.clone());
        Ok(row)
    }

    async fn recent_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<CheckResult> = state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_at.cmp(&a.checked_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn checks_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<CheckResult>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<CheckResult> = state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id && range.contains(c.checked_at))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_at.cmp(&a.checked_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn enabled_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alert_configs
            .values()
            .filter(|c| c.monitor_id == monitor_id && c.enabled)
            .cloned()
            .collect())
    }

    async fn latest_alert_for_config(
        &self,
        monitor_id: MonitorId,
        alert_config_id: AlertConfigId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alert_history
            .iter()
            .filter(|e| e.monitor_id == monitor_id && e.alert_config_id == Some(alert_config_id))
            .max_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn record_alert(
        &self,
        entry: NewAlertHistoryEntry,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let mut state = self.state.lock().await;
        if !state.monitors.contains_key(&entry.monitor_id) {
            return Err(StoreError::NotFound(format!("monitor {}", entry.monitor_id)));
        }
        let id = state.allocate_id();
        let row = AlertHistoryEntry::from_new(id, entry);
        state.alert_history.push(row.clone());
        Ok(row)
    }

    async fn alert_history_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<AlertHistoryEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<AlertHistoryEntry> = state
            .alert_history
            .iter()
            .filter(|e| e.monitor_id == monitor_id && range.contains(e.recorded_at))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn create_monitor(
        &self,
        new: NewMonitor,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        new.validate()?;
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        let monitor = Monitor {
            id,
            user_id: new.user_id,
            url: new.url,
            monitor_type: new.monitor_type,
            check_interval_seconds: new.check_interval_seconds,
            timeout_seconds: new.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            status: MonitorStatus::Unknown,
            last_checked_at: None,
            last_status_change_at: None,
            next_check_at: now,
            content_match: new.content_match,
            http_method: new.http_method,
            http_headers: new.http_headers,
            created_at: now,
            updated_at: now,
        };
        state.monitors.insert(
            id,
            MonitorRecord {
                monitor: monitor.clone(),
                lease: None,
            },
        );
        Ok(monitor)
    }

    async fn update_monitor(
        &self,
        monitor_id: MonitorId,
        changes: MonitorChanges,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(monitor_id)?;
        changes.apply_to(&mut record.monitor)?;
        record.monitor.updated_at = now;
        record.monitor.next_check_at = now + record.monitor.interval();
        Ok(record.monitor.clone())
    }

    async fn set_monitor_paused(
        &self,
        monitor_id: MonitorId,
        paused: bool,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(monitor_id)?;
        let monitor = &mut record.monitor;
        let was_paused = monitor.status == MonitorStatus::Paused;
        if paused == was_paused {
            return Ok(monitor.clone());
        }
        if paused {
            monitor.status = MonitorStatus::Paused;
        } else {
            monitor.status = MonitorStatus::Unknown;
            monitor.next_check_at = now;
        }
        monitor.updated_at = now;
        Ok(monitor.clone())
    }

    async fn delete_monitor(&self, monitor_id: MonitorId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.monitors.remove(&monitor_id).is_none() {
            return Ok(false);
        }
        state.checks.retain(|c| c.monitor_id != monitor_id);
        state.alert_configs.retain(|_, c| c.monitor_id != monitor_id);
        state.alert_history.retain(|e| e.monitor_id != monitor_id);
        Ok(true)
    }

    async fn get_monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.monitors.get(&monitor_id).map(|r| r.monitor.clone()))
    }

    async fn list_monitors_for_user(&self, user_id: i64) -> Result<Vec<Monitor>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .monitors
            .values()
            .filter(|r| r.monitor.user_id == user_id)
            .map(|r| r.monitor.clone())
            .collect())
    }

    async fn create_alert_config(
        &self,
        new: NewAlertConfiguration,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        new.validate()?;
        let mut state = self.state.lock().await;
        if !state.monitors.contains_key(&new.monitor_id) {
            return Err(StoreError::NotFound(format!("monitor {}", new.monitor_id)));
        }
        let id = state.allocate_id();
        let config = AlertConfiguration {
            id,
            monitor_id: new.monitor_id,
            alert_type: new.alert_type,
            destination: new.destination,
            enabled: new.enabled,
            failure_threshold: new.failure_threshold,
            recovery_threshold: new.recovery_threshold,
            created_at: now,
            updated_at: now,
        };
        state.alert_configs.insert(id, config.clone());
        Ok(config)
    }

    async fn update_alert_config(
        &self,
        alert_config_id: AlertConfigId,
        changes: AlertConfigurationChanges,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        let mut state = self.state.lock().await;
        let config = state
            .alert_configs
            .get_mut(&alert_config_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert configuration {alert_config_id}")))?;
        changes.apply_to(config)?;
        config.updated_at = now;
        Ok(config.clone())
    }

    async fn delete_alert_config(
        &self,
        alert_config_id: AlertConfigId,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.alert_configs.remove(&alert_config_id).is_none() {
            return Ok(false);
        }
        for entry in state
            .alert_history
            .iter_mut()
            .filter(|e| e.alert_config_id == Some(alert_config_id))
        {
            entry.alert_config_id = None;
        }
        Ok(true)
    }

    async fn list_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alert_configs
            .values()
            .filter(|c| c.monitor_id == monitor_id)
            .cloned()
            .collect())
    }
}
