use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use watchdog::alerting::{AlertingSettings, EvaluationService};
use watchdog::checks::{ProbeOutcome, Prober};
use watchdog::db::enums::{AlertOutcome, AlertType, ErrorCategory, MonitorStatus, MonitorType};
use watchdog::db::models::{
    Monitor, MonitorChanges, NewAlertConfiguration, NewCheckResult, NewMonitor,
};
use watchdog::db::services::InMemoryStore;
use watchdog::db::store::{CheckCompletion, CompletionOutcome, MonitorStore};
use watchdog::notifications::{NotificationHandler, NotificationRegistry, SenderError};
use watchdog::scheduler::{MonitorScheduler, SchedulerConfig, TickOutcome};

const INTERVAL: i64 = 60;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
}

/// Replays a queue of up/down results, stamping each with the shared clock.
struct ScriptedProber {
    results: Mutex<VecDeque<bool>>,
    clock: Arc<Mutex<DateTime<Utc>>>,
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, monitor: &Monitor) -> NewCheckResult {
        let is_up = self.results.lock().await.pop_front().unwrap_or(true);
        let outcome = if is_up {
            ProbeOutcome::up(12)
        } else {
            ProbeOutcome::failed(
                ErrorCategory::HttpServerError,
                "HTTP Error 503: Service Unavailable",
                Duration::from_millis(40),
            )
        };
        let mut check = outcome.into_check(monitor.id, *self.clock.lock().await);
        if !is_up {
            check.http_status = Some(503);
        }
        check
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotificationHandler for RecordingSender {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError> {
        self.sent
            .lock()
            .await
            .push((destination.to_string(), message.to_string()));
        Ok(())
    }
}

struct FailingSender;

#[async_trait]
impl NotificationHandler for FailingSender {
    async fn send(&self, _destination: &str, _message: &str) -> Result<(), SenderError> {
        Err(SenderError::SendFailed("channel rejected the message".to_string()))
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    scheduler: Arc<MonitorScheduler>,
    prober: Arc<ScriptedProber>,
    clock: Arc<Mutex<DateTime<Utc>>>,
    webhook: Arc<RecordingSender>,
    monitor: Monitor,
}

impl Harness {
    async fn new(throttle_window: chrono::Duration) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(Mutex::new(t0()));
        let prober = Arc::new(ScriptedProber {
            results: Mutex::new(VecDeque::new()),
            clock: clock.clone(),
        });
        let webhook = Arc::new(RecordingSender::default());

        let mut registry = NotificationRegistry::new();
        registry.register(AlertType::GenericWebhook, webhook.clone());
        registry.register(AlertType::DiscordWebhook, Arc::new(FailingSender));
        let alerting = Arc::new(EvaluationService::new(
            store.clone(),
            Arc::new(registry),
            AlertingSettings {
                throttle_window,
                send_timeout: Duration::from_secs(5),
            },
        ));
        let scheduler = Arc::new(MonitorScheduler::new(
            store.clone(),
            prober.clone(),
            alerting,
            SchedulerConfig {
                tick_interval: Duration::from_millis(50),
                max_concurrent_checks: 4,
                claim_lease: Duration::from_secs(120),
                worker_id: "flow-worker".to_string(),
            },
        ));

        let monitor = store
            .create_monitor(
                NewMonitor {
                    user_id: 1,
                    url: "https://shop.example".to_string(),
                    monitor_type: MonitorType::Http,
                    check_interval_seconds: INTERVAL as i32,
                    timeout_seconds: Some(5),
                    content_match: None,
                    http_method: None,
                    http_headers: None,
                },
                t0(),
            )
            .await
            .unwrap();

        Self {
            store,
            scheduler,
            prober,
            clock,
            webhook,
            monitor,
        }
    }

    async fn add_alert(
        &self,
        alert_type: AlertType,
        failure_threshold: i32,
        recovery_threshold: Option<i32>,
    ) -> i64 {
        self.store
            .create_alert_config(
                NewAlertConfiguration {
                    monitor_id: self.monitor.id,
                    alert_type,
                    destination: "https://hooks.example/ops".to_string(),
                    enabled: true,
                    failure_threshold,
                    recovery_threshold,
                },
                t0(),
            )
            .await
            .unwrap()
            .id
    }

    /// Advances the clock past the next due time and runs one tick with the given result.
    async fn step(&self, is_up: bool) -> TickOutcome {
        let now = {
            let mut clock = self.clock.lock().await;
            *clock += chrono::Duration::seconds(INTERVAL + 1);
            *clock
        };
        self.prober.results.lock().await.push_back(is_up);
        self.scheduler.run_tick(now).await
    }

    async fn outcomes(&self) -> Vec<AlertOutcome> {
        self.store
            .alert_history(self.monitor.id)
            .await
            .iter()
            .map(|entry| entry.outcome)
            .collect()
    }
}

#[tokio::test]
async fn outage_alert_fires_once_at_threshold() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    h.add_alert(AlertType::GenericWebhook, 3, None).await;

    h.step(false).await;
    h.step(false).await;
    assert!(h.outcomes().await.is_empty());

    h.step(false).await;
    assert_eq!(h.outcomes().await, vec![AlertOutcome::Sent]);
    let sent = h.webhook.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].1,
        "Monitor https://shop.example is DOWN! [HTTP_SERVER_ERROR] HTTP Error 503: Service Unavailable"
    );

    h.step(false).await;
    assert_eq!(h.outcomes().await, vec![AlertOutcome::Sent]);
    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Down);
}

#[tokio::test]
async fn repeated_outage_within_window_is_throttled() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    h.add_alert(AlertType::GenericWebhook, 1, None).await;

    h.step(false).await;
    h.step(true).await;
    h.step(false).await;

    assert_eq!(
        h.outcomes().await,
        vec![AlertOutcome::Sent, AlertOutcome::Throttled]
    );
    let history = h.store.alert_history(h.monitor.id).await;
    assert!(history[1].message.ends_with("(throttled)"));
    assert_eq!(h.webhook.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn recovery_fires_after_consecutive_successes() {
    let h = Harness::new(chrono::Duration::minutes(1)).await;
    h.add_alert(AlertType::GenericWebhook, 1, Some(2)).await;

    h.step(false).await;
    h.step(true).await;
    assert_eq!(h.outcomes().await, vec![AlertOutcome::Sent]);

    h.step(true).await;
    assert_eq!(h.outcomes().await, vec![AlertOutcome::Sent, AlertOutcome::Sent]);
    let sent = h.webhook.sent.lock().await.clone();
    assert_eq!(sent[1].1, "Monitor https://shop.example is UP again!");

    h.step(true).await;
    assert_eq!(h.outcomes().await.len(), 2);
}

#[tokio::test]
async fn missing_recovery_threshold_never_notifies_recovery() {
    let h = Harness::new(chrono::Duration::zero()).await;
    h.add_alert(AlertType::GenericWebhook, 1, None).await;

    h.step(false).await;
    for _ in 0..4 {
        h.step(true).await;
    }
    assert_eq!(h.outcomes().await, vec![AlertOutcome::Sent]);
}

#[tokio::test]
async fn tick_records_one_check_and_reschedules_from_claim_time() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;

    let outcome = h.step(true).await;
    let now = *h.clock.lock().await;
    assert_eq!(
        outcome,
        TickOutcome::Processed {
            monitor_id: h.monitor.id,
            status: Some(MonitorStatus::Up),
            committed: true,
        }
    );
    assert_eq!(h.store.check_count(h.monitor.id).await, 1);
    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert_eq!(monitor.next_check_at, now + chrono::Duration::seconds(INTERVAL));
    assert_eq!(monitor.last_checked_at, Some(now));
    assert_eq!(monitor.last_status_change_at, Some(now));

    // Not due again until the interval has elapsed.
    assert_eq!(h.scheduler.run_tick(now).await, TickOutcome::Idle);
    assert_eq!(h.store.check_count(h.monitor.id).await, 1);
}

#[tokio::test]
async fn failing_channel_does_not_block_other_channels() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    let discord = h.add_alert(AlertType::DiscordWebhook, 1, None).await;
    let webhook = h.add_alert(AlertType::GenericWebhook, 1, None).await;

    h.step(false).await;

    let history = h.store.alert_history(h.monitor.id).await;
    assert_eq!(history.len(), 2);
    let failed = history
        .iter()
        .find(|e| e.alert_config_id == Some(discord))
        .unwrap();
    assert_eq!(failed.outcome, AlertOutcome::Failed);
    assert!(failed
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("channel rejected the message"));
    let sent = history
        .iter()
        .find(|e| e.alert_config_id == Some(webhook))
        .unwrap();
    assert_eq!(sent.outcome, AlertOutcome::Sent);

    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Down);
}

#[tokio::test]
async fn unregistered_channel_writes_no_history() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    h.add_alert(AlertType::Telegram, 1, None).await;

    let outcome = h.step(false).await;
    assert!(matches!(outcome, TickOutcome::Processed { committed: true, .. }));
    assert!(h.outcomes().await.is_empty());
}

#[tokio::test]
async fn expired_lease_is_taken_over_and_stale_completion_rejected() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    let claimed_at = t0() + chrono::Duration::seconds(1);

    let stale = h
        .store
        .claim_due_monitor(claimed_at, Duration::from_secs(30), "crashed-worker")
        .await
        .unwrap()
        .unwrap();

    // Still leased: nothing to claim.
    let during_lease = claimed_at + chrono::Duration::seconds(10);
    assert_eq!(h.scheduler.run_tick(during_lease).await, TickOutcome::Idle);

    let after_lease = claimed_at + chrono::Duration::seconds(31);
    *h.clock.lock().await = after_lease;
    h.prober.results.lock().await.push_back(true);
    assert!(matches!(
        h.scheduler.run_tick(after_lease).await,
        TickOutcome::Processed { committed: true, .. }
    ));

    let late = h
        .store
        .complete_claim(
            &stale,
            CheckCompletion {
                status: Some(MonitorStatus::Down),
                checked_at: claimed_at,
            },
        )
        .await
        .unwrap();
    assert_eq!(late, CompletionOutcome::ClaimLost);
    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Up);
    assert_eq!(h.store.check_count(h.monitor.id).await, 1);
}

/// Edits the monitor's interval while its probe is in flight.
struct EditingProber {
    store: Arc<InMemoryStore>,
    edited_at: DateTime<Utc>,
}

#[async_trait]
impl Prober for EditingProber {
    async fn probe(&self, monitor: &Monitor) -> NewCheckResult {
        self.store
            .update_monitor(
                monitor.id,
                MonitorChanges {
                    check_interval_seconds: Some(300),
                    ..MonitorChanges::default()
                },
                self.edited_at,
            )
            .await
            .unwrap();
        ProbeOutcome::up(8).into_check(monitor.id, self.edited_at)
    }
}

#[tokio::test]
async fn interval_edit_during_check_keeps_edited_schedule() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    let claim_time = t0() + chrono::Duration::seconds(5);
    let edited_at = claim_time + chrono::Duration::seconds(1);

    let alerting = Arc::new(EvaluationService::new(
        h.store.clone(),
        Arc::new(NotificationRegistry::new()),
        AlertingSettings::default(),
    ));
    let scheduler = MonitorScheduler::new(
        h.store.clone(),
        Arc::new(EditingProber {
            store: h.store.clone(),
            edited_at,
        }),
        alerting,
        SchedulerConfig {
            worker_id: "edit-worker".to_string(),
            ..SchedulerConfig::default()
        },
    );

    assert!(matches!(
        scheduler.run_tick(claim_time).await,
        TickOutcome::Processed { committed: true, .. }
    ));
    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert_eq!(monitor.check_interval_seconds, 300);
    assert_eq!(monitor.next_check_at, edited_at + chrono::Duration::seconds(300));
    assert_eq!(monitor.status, MonitorStatus::Up);
}

#[tokio::test]
async fn running_scheduler_checks_due_monitors() {
    let h = Harness::new(chrono::Duration::minutes(60)).await;
    // The clock-driven harness monitor dates from 2024, so it is due now.
    let handle = h.scheduler.clone().start();
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.stop().await.unwrap();

    assert_eq!(h.store.check_count(h.monitor.id).await, 1);
    let monitor = h.store.get_monitor(h.monitor.id).await.unwrap().unwrap();
    assert!(monitor.next_check_at > Utc::now());
}
