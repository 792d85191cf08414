use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use watchdog::alerting::{AlertingSettings, EvaluationService};
use watchdog::checks::{ProbeOutcome, Prober};
use watchdog::db::enums::{MonitorStatus, MonitorType};
use watchdog::db::models::{
    AlertConfigId, AlertConfiguration, AlertConfigurationChanges, AlertHistoryEntry, CheckResult,
    Monitor, MonitorChanges, MonitorId, NewAlertConfiguration, NewAlertHistoryEntry,
    NewCheckResult, NewMonitor, Page, PageRequest, TimeRange,
};
use watchdog::db::services::InMemoryStore;
use watchdog::db::store::{CheckCompletion, Claim, CompletionOutcome, MonitorStore, StoreError};
use watchdog::notifications::NotificationRegistry;
use watchdog::scheduler::{MonitorScheduler, SchedulerConfig, TickOutcome};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// In-memory store whose claim and check-log writes can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_claims: AtomicBool,
    fail_check_writes: AtomicBool,
}

impl FlakyStore {
    fn unavailable() -> StoreError {
        StoreError::Unavailable("connection pool exhausted".to_string())
    }
}

#[async_trait]
impl MonitorStore for FlakyStore {
    async fn claim_due_monitor(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Claim>, StoreError> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.claim_due_monitor(now, lease, worker_id).await
    }

    async fn complete_claim(
        &self,
        claim: &Claim,
        completion: CheckCompletion,
    ) -> Result<CompletionOutcome, StoreError> {
        self.inner.complete_claim(claim, completion).await
    }

    async fn record_check(&self, check: NewCheckResult) -> Result<CheckResult, StoreError> {
        if self.fail_check_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.record_check(check).await
    }

    async fn recent_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        self.inner.recent_checks(monitor_id, limit).await
    }

    async fn checks_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<CheckResult>, StoreError> {
        self.inner.checks_in_range(monitor_id, range, page).await
    }

    async fn enabled_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        self.inner.enabled_alert_configs(monitor_id).await
    }

    async fn latest_alert_for_config(
        &self,
        monitor_id: MonitorId,
        alert_config_id: AlertConfigId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError> {
        self.inner
            .latest_alert_for_config(monitor_id, alert_config_id)
            .await
    }

    async fn record_alert(
        &self,
        entry: NewAlertHistoryEntry,
    ) -> Result<AlertHistoryEntry, StoreError> {
        self.inner.record_alert(entry).await
    }

    async fn alert_history_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<AlertHistoryEntry>, StoreError> {
        self.inner.alert_history_in_range(monitor_id, range, page).await
    }

    async fn create_monitor(
        &self,
        monitor: NewMonitor,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        self.inner.create_monitor(monitor, now).await
    }

    async fn update_monitor(
        &self,
        monitor_id: MonitorId,
        changes: MonitorChanges,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        self.inner.update_monitor(monitor_id, changes, now).await
    }

    async fn set_monitor_paused(
        &self,
        monitor_id: MonitorId,
        paused: bool,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        self.inner.set_monitor_paused(monitor_id, paused, now).await
    }

    async fn delete_monitor(&self, monitor_id: MonitorId) -> Result<bool, StoreError> {
        self.inner.delete_monitor(monitor_id).await
    }

    async fn get_monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StoreError> {
        self.inner.get_monitor(monitor_id).await
    }

    async fn list_monitors_for_user(&self, user_id: i64) -> Result<Vec<Monitor>, StoreError> {
        self.inner.list_monitors_for_user(user_id).await
    }

    async fn create_alert_config(
        &self,
        config: NewAlertConfiguration,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        self.inner.create_alert_config(config, now).await
    }

    async fn update_alert_config(
        &self,
        alert_config_id: AlertConfigId,
        changes: AlertConfigurationChanges,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        self.inner
            .update_alert_config(alert_config_id, changes, now)
            .await
    }

    async fn delete_alert_config(
        &self,
        alert_config_id: AlertConfigId,
    ) -> Result<bool, StoreError> {
        self.inner.delete_alert_config(alert_config_id).await
    }

    async fn list_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        self.inner.list_alert_configs(monitor_id).await
    }
}

struct CountingProber {
    probes: AtomicUsize,
}

#[async_trait]
impl Prober for CountingProber {
    async fn probe(&self, monitor: &Monitor) -> NewCheckResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        ProbeOutcome::up(3).into_check(monitor.id, Utc::now())
    }
}

async fn setup() -> (Arc<FlakyStore>, Arc<CountingProber>, MonitorScheduler, Monitor) {
    let store = Arc::new(FlakyStore::default());
    let prober = Arc::new(CountingProber {
        probes: AtomicUsize::new(0),
    });
    let alerting = Arc::new(EvaluationService::new(
        store.clone(),
        Arc::new(NotificationRegistry::new()),
        AlertingSettings::default(),
    ));
    let scheduler = MonitorScheduler::new(
        store.clone(),
        prober.clone(),
        alerting,
        SchedulerConfig {
            worker_id: "flaky-worker".to_string(),
            ..SchedulerConfig::default()
        },
    );
    let monitor = store
        .create_monitor(
            NewMonitor {
                user_id: 1,
                url: "db.internal:5432".to_string(),
                monitor_type: MonitorType::Port,
                check_interval_seconds: 30,
                timeout_seconds: None,
                content_match: None,
                http_method: None,
                http_headers: None,
            },
            t0(),
        )
        .await
        .unwrap();
    (store, prober, scheduler, monitor)
}

#[tokio::test]
async fn failed_claim_skips_tick_and_leaves_monitor_due() {
    let (store, prober, scheduler, monitor) = setup().await;
    let now = t0() + chrono::Duration::seconds(1);

    store.fail_claims.store(true, Ordering::SeqCst);
    assert_eq!(scheduler.run_tick(now).await, TickOutcome::ClaimFailed);
    assert_eq!(prober.probes.load(Ordering::SeqCst), 0);
    let untouched = store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert_eq!(untouched.next_check_at, t0());
    assert_eq!(untouched.status, MonitorStatus::Unknown);

    store.fail_claims.store(false, Ordering::SeqCst);
    let later = now + chrono::Duration::seconds(2);
    assert_eq!(
        scheduler.run_tick(later).await,
        TickOutcome::Processed {
            monitor_id: monitor.id,
            status: Some(MonitorStatus::Up),
            committed: true,
        }
    );
    assert_eq!(prober.probes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unrecorded_check_still_reschedules() {
    let (store, prober, scheduler, monitor) = setup().await;
    let claimed_at = t0() + chrono::Duration::seconds(1);

    store.fail_check_writes.store(true, Ordering::SeqCst);
    assert_eq!(
        scheduler.run_tick(claimed_at).await,
        TickOutcome::Processed {
            monitor_id: monitor.id,
            status: None,
            committed: true,
        }
    );
    assert_eq!(prober.probes.load(Ordering::SeqCst), 1);
    assert_eq!(store.inner.check_count(monitor.id).await, 0);

    let rescheduled = store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert_eq!(
        rescheduled.next_check_at,
        claimed_at + chrono::Duration::seconds(30)
    );
    assert_eq!(rescheduled.status, MonitorStatus::Unknown);
    assert_eq!(rescheduled.last_checked_at, None);

    // Released: not claimable again until the new due time.
    assert_eq!(
        scheduler.run_tick(claimed_at + chrono::Duration::seconds(5)).await,
        TickOutcome::Idle
    );
}
