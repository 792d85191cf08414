//! PostgreSQL implementation of [`MonitorStore`].
//!
//! Claims use `FOR UPDATE SKIP LOCKED` plus a lease stamped on the row, so
//! the row lock only lives for the claim statement itself and a crashed
//! worker's monitor becomes claimable again once the lease runs out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::db::enums::MonitorStatus;
use crate::db::models::{
    AlertConfigId, AlertConfiguration, AlertConfigurationChanges, AlertHistoryEntry, CheckResult,
    LatencyBreakdown, Monitor, MonitorChanges, MonitorId, NewAlertConfiguration,
    NewAlertHistoryEntry, NewCheckResult, NewMonitor, Page, PageRequest, TimeRange,
    DEFAULT_TIMEOUT_SECONDS,
};
use crate::db::store::{
    lease_deadline, CheckCompletion, Claim, CompletionOutcome, MonitorStore, StoreError,
};

macro_rules! monitor_columns {
    () => {
        "id, user_id, url, monitor_type, check_interval_seconds, timeout_seconds, status, \
         last_checked_at, last_status_change_at, next_check_at, content_match, http_method, \
         http_headers, created_at, updated_at, claimed_by, claimed_at, claim_expires_at"
    };
}

macro_rules! check_columns {
    () => {
        "id, monitor_id, checked_at, is_up, http_status, response_time_ms, dns_ms, connect_ms, \
         ttfb_ms, latency_exact, response_size_bytes, error_category, error_message"
    };
}

macro_rules! alert_config_columns {
    () => {
        "id, monitor_id, alert_type, destination, enabled, failure_threshold, recovery_threshold, \
         created_at, updated_at"
    };
}

macro_rules! alert_history_columns {
    () => {
        "id, monitor_id, alert_config_id, recorded_at, message, outcome, failure_reason"
    };
}

#[derive(Debug, FromRow)]
struct MonitorRow {
    id: i64,
    user_id: i64,
    url: String,
    monitor_type: String,
    check_interval_seconds: i32,
    timeout_seconds: i32,
    status: String,
    last_checked_at: Option<DateTime<Utc>>,
    last_status_change_at: Option<DateTime<Utc>>,
    next_check_at: DateTime<Utc>,
    content_match: Option<String>,
    http_method: Option<String>,
    http_headers: Option<Json<HashMap<String, String>>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    claim_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<MonitorRow> for Monitor {
    type Error = StoreError;

    fn try_from(row: MonitorRow) -> Result<Self, Self::Error> {
        Ok(Monitor {
            id: row.id,
            user_id: row.user_id,
            url: row.url,
            monitor_type: row.monitor_type.parse()?,
            check_interval_seconds: row.check_interval_seconds,
            timeout_seconds: row.timeout_seconds,
            status: row.status.parse()?,
            last_checked_at: row.last_checked_at,
            last_status_change_at: row.last_status_change_at,
            next_check_at: row.next_check_at,
            content_match: row.content_match,
            http_method: row.http_method,
            http_headers: row.http_headers.map(|Json(headers)| headers),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CheckRow {
    id: i64,
    monitor_id: i64,
    checked_at: DateTime<Utc>,
    is_up: bool,
    http_status: Option<i32>,
    response_time_ms: i64,
    dns_ms: Option<i64>,
    connect_ms: Option<i64>,
    ttfb_ms: Option<i64>,
    latency_exact: Option<bool>,
    response_size_bytes: Option<i64>,
    error_category: String,
    error_message: Option<String>,
}

impl TryFrom<CheckRow> for CheckResult {
    type Error = StoreError;

    fn try_from(row: CheckRow) -> Result<Self, Self::Error> {
        let latency = row.latency_exact.map(|exact| LatencyBreakdown {
            dns_ms: row.dns_ms,
            connect_ms: row.connect_ms,
            ttfb_ms: row.ttfb_ms,
            exact,
        });
        Ok(CheckResult {
            id: row.id,
            monitor_id: row.monitor_id,
            checked_at: row.checked_at,
            is_up: row.is_up,
            http_status: row.http_status,
            response_time_ms: row.response_time_ms,
            latency,
            response_size_bytes: row.response_size_bytes,
            error_category: row.error_category.parse()?,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertConfigRow {
    id: i64,
    monitor_id: i64,
    alert_type: String,
    destination: String,
    enabled: bool,
    failure_threshold: i32,
    recovery_threshold: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertConfigRow> for AlertConfiguration {
    type Error = StoreError;

    fn try_from(row: AlertConfigRow) -> Result<Self, Self::Error> {
        Ok(AlertConfiguration {
            id: row.id,
            monitor_id: row.monitor_id,
            alert_type: row.alert_type.parse()?,
            destination: row.destination,
            enabled: row.enabled,
            failure_threshold: row.failure_threshold,
            recovery_threshold: row.recovery_threshold,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertHistoryRow {
    id: i64,
    monitor_id: i64,
    alert_config_id: Option<i64>,
    recorded_at: DateTime<Utc>,
    message: String,
    outcome: String,
    failure_reason: Option<String>,
}

impl TryFrom<AlertHistoryRow> for AlertHistoryEntry {
    type Error = StoreError;

    fn try_from(row: AlertHistoryRow) -> Result<Self, Self::Error> {
        Ok(AlertHistoryEntry {
            id: row.id,
            monitor_id: row.monitor_id,
            alert_config_id: row.alert_config_id,
            recorded_at: row.recorded_at,
            message: row.message,
            outcome: row.outcome.parse()?,
            failure_reason: row.failure_reason,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Maps a foreign key violation on insert to `NotFound` for the parent monitor.
fn missing_parent(err: sqlx::Error, monitor_id: MonitorId) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::NotFound(format!("monitor {monitor_id}"))
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Database connection pool created.");
        Ok(Self::from_pool(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied.");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn page_count(
        &self,
        sql: &str,
        monitor_id: MonitorId,
        range: TimeRange,
    ) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar(sql)
            .bind(monitor_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn claim_due_monitor(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Claim>, StoreError> {
        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            r#"
            UPDATE monitors
            SET claimed_by = $1, claimed_at = $2, claim_expires_at = $3
            WHERE id = (
                SELECT id FROM monitors
                WHERE next_check_at < $2
                  AND status <> 'PAUSED'
                  AND (claim_expires_at IS NULL OR claim_expires_at <= $2)
                ORDER BY next_check_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND (claim_expires_at IS NULL OR claim_expires_at <= $2)
            RETURNING "#,
            monitor_columns!()
        ))
        .bind(worker_id)
        .bind(now)
        .bind(lease_deadline(now, lease))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        // The database truncates to microseconds; completion must match the stored value.
        let claimed_at = row.claimed_at.unwrap_or(now);
        let lease_expires_at = row.claim_expires_at.unwrap_or(now);
        let worker_id = row.claimed_by.clone().unwrap_or_else(|| worker_id.to_string());
        Ok(Some(Claim {
            monitor: Monitor::try_from(row)?,
            worker_id,
            claimed_at,
            lease_expires_at,
        }))
    }

    async fn complete_claim(
        &self,
        claim: &Claim,
        completion: CheckCompletion,
    ) -> Result<CompletionOutcome, StoreError> {
        let status = completion.status.map(|s| s.as_str());
        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            r#"
            UPDATE monitors SET
                status = CASE
                    WHEN status = 'PAUSED' OR $3::text IS NULL THEN status
                    ELSE $3::text
                END,
                last_status_change_at = CASE
                    WHEN status <> 'PAUSED' AND $3::text IS NOT NULL AND status <> $3::text THEN $4
                    ELSE last_status_change_at
                END,
                last_checked_at = CASE WHEN $3::text IS NULL THEN last_checked_at ELSE $4 END,
                next_check_at = CASE
                    WHEN updated_at > claimed_at THEN next_check_at
                    ELSE claimed_at + check_interval_seconds * INTERVAL '1 second'
                END,
                claimed_by = NULL,
                claimed_at = NULL,
                claim_expires_at = NULL
            WHERE id = $1 AND claimed_by = $2 AND claimed_at = $5
            RETURNING "#,
            monitor_columns!()
        ))
        .bind(claim.monitor.id)
        .bind(&claim.worker_id)
        .bind(status)
        .bind(completion.checked_at)
        .bind(claim.claimed_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(CompletionOutcome::Committed(row.try_into()?)),
            None => Ok(CompletionOutcome::ClaimLost),
        }
    }

    async fn record_check(&self, check: NewCheckResult) -> Result<CheckResult, StoreError> {
        let monitor_id = check.monitor_id;
        let latency = check.latency;
        let row = sqlx::query_as::<_, CheckRow>(concat!(
            r#"
            INSERT INTO monitor_checks (
                monitor_id, checked_at, is_up, http_status, response_time_ms, dns_ms,
                connect_ms, ttfb_ms, latency_exact, response_size_bytes, error_category, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING "#,
            check_columns!()
        ))
        .bind(check.monitor_id)
        .bind(check.checked_at)
        .bind(check.is_up)
        .bind(check.http_status)
        .bind(check.response_time_ms)
        .bind(latency.and_then(|l| l.dns_ms))
        .bind(latency.and_then(|l| l.connect_ms))
        .bind(latency.and_then(|l| l.ttfb_ms))
        .bind(latency.map(|l| l.exact))
        .bind(check.response_size_bytes)
        .bind(check.error_category.as_str())
        .bind(check.error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, monitor_id))?;
        row.try_into()
    }

    async fn recent_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let rows = sqlx::query_as::<_, CheckRow>(concat!(
            "SELECT ",
            check_columns!(),
            " FROM monitor_checks WHERE monitor_id = $1 ORDER BY checked_at DESC, id DESC LIMIT $2"
        ))
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn checks_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<CheckResult>, StoreError> {
        let total = self
            .page_count(
                r#"
                SELECT COUNT(*) FROM monitor_checks
                WHERE monitor_id = $1
                  AND ($2::timestamptz IS NULL OR checked_at >= $2)
                  AND ($3::timestamptz IS NULL OR checked_at <= $3)
                "#,
                monitor_id,
                range,
            )
            .await?;
        let rows = sqlx::query_as::<_, CheckRow>(concat!(
            "SELECT ",
            check_columns!(),
            r#"
            FROM monitor_checks
            WHERE monitor_id = $1
              AND ($2::timestamptz IS NULL OR checked_at >= $2)
              AND ($3::timestamptz IS NULL OR checked_at <= $3)
            ORDER BY checked_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(monitor_id)
        .bind(range.start)
        .bind(range.end)
        .bind(i64::from(page.size))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            items: convert_all(rows)?,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn enabled_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        let rows = sqlx::query_as::<_, AlertConfigRow>(concat!(
            "SELECT ",
            alert_config_columns!(),
            " FROM alert_configurations WHERE monitor_id = $1 AND enabled = TRUE ORDER BY id"
        ))
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn latest_alert_for_config(
        &self,
        monitor_id: MonitorId,
        alert_config_id: AlertConfigId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError> {
        let row = sqlx::query_as::<_, AlertHistoryRow>(concat!(
            "SELECT ",
            alert_history_columns!(),
            r#"
            FROM alert_history
            WHERE monitor_id = $1 AND alert_config_id = $2
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(monitor_id)
        .bind(alert_config_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AlertHistoryEntry::try_from).transpose()
    }

    async fn record_alert(
        &self,
        entry: NewAlertHistoryEntry,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let monitor_id = entry.monitor_id;
        let row = sqlx::query_as::<_, AlertHistoryRow>(concat!(
            r#"
            INSERT INTO alert_history (monitor_id, alert_config_id, recorded_at, message, outcome, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING "#,
            alert_history_columns!()
        ))
        .bind(entry.monitor_id)
        .bind(entry.alert_config_id)
        .bind(entry.recorded_at)
        .bind(entry.message)
        .bind(entry.outcome.as_str())
        .bind(entry.failure_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, monitor_id))?;
        row.try_into()
    }

    async fn alert_history_in_range(
        &self,
        monitor_id: MonitorId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<Page<AlertHistoryEntry>, StoreError> {
        let total = self
            .page_count(
                r#"
                SELECT COUNT(*) FROM alert_history
                WHERE monitor_id = $1
                  AND ($2::timestamptz IS NULL OR recorded_at >= $2)
                  AND ($3::timestamptz IS NULL OR recorded_at <= $3)
                "#,
                monitor_id,
                range,
            )
            .await?;
        let rows = sqlx::query_as::<_, AlertHistoryRow>(concat!(
            "SELECT ",
            alert_history_columns!(),
            r#"
            FROM alert_history
            WHERE monitor_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
              AND ($3::timestamptz IS NULL OR recorded_at <= $3)
            ORDER BY recorded_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(monitor_id)
        .bind(range.start)
        .bind(range.end)
        .bind(i64::from(page.size))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            items: convert_all(rows)?,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn create_monitor(
        &self,
        new: NewMonitor,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        new.validate()?;
        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            r#"
            INSERT INTO monitors (
                user_id, url, monitor_type, check_interval_seconds, timeout_seconds, status,
                next_check_at, content_match, http_method, http_headers, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $7, $7)
            RETURNING "#,
            monitor_columns!()
        ))
        .bind(new.user_id)
        .bind(new.url)
        .bind(new.monitor_type.as_str())
        .bind(new.check_interval_seconds)
        .bind(new.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
        .bind(MonitorStatus::Unknown.as_str())
        .bind(now)
        .bind(new.content_match)
        .bind(new.http_method)
        .bind(new.http_headers.map(Json))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_monitor(
        &self,
        monitor_id: MonitorId,
        changes: MonitorChanges,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            "SELECT ",
            monitor_columns!(),
            " FROM monitors WHERE id = $1 FOR UPDATE"
        ))
        .bind(monitor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("monitor {monitor_id}")))?;

        let mut monitor = Monitor::try_from(row)?;
        changes.apply_to(&mut monitor)?;
        let next_check_at = now + monitor.interval();

        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            r#"
            UPDATE monitors SET
                url = $2, monitor_type = $3, check_interval_seconds = $4, timeout_seconds = $5,
                content_match = $6, http_method = $7, http_headers = $8,
                next_check_at = $9, updated_at = $10
            WHERE id = $1
            RETURNING "#,
            monitor_columns!()
        ))
        .bind(monitor_id)
        .bind(monitor.url)
        .bind(monitor.monitor_type.as_str())
        .bind(monitor.check_interval_seconds)
        .bind(monitor.timeout_seconds)
        .bind(monitor.content_match)
        .bind(monitor.http_method)
        .bind(monitor.http_headers.map(Json))
        .bind(next_check_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn set_monitor_paused(
        &self,
        monitor_id: MonitorId,
        paused: bool,
        now: DateTime<Utc>,
    ) -> Result<Monitor, StoreError> {
        let sql = if paused {
            concat!(
                "UPDATE monitors SET \
                    updated_at = CASE WHEN status = 'PAUSED' THEN updated_at ELSE $2 END, \
                    status = 'PAUSED' \
                 WHERE id = $1 RETURNING ",
                monitor_columns!()
            )
        } else {
            concat!(
                r#"
                UPDATE monitors SET
                    next_check_at = CASE WHEN status = 'PAUSED' THEN $2 ELSE next_check_at END,
                    status = CASE WHEN status = 'PAUSED' THEN 'UNKNOWN' ELSE status END,
                    updated_at = CASE WHEN status = 'PAUSED' THEN $2 ELSE updated_at END
                WHERE id = $1
                RETURNING "#,
                monitor_columns!()
            )
        };
        let row = sqlx::query_as::<_, MonitorRow>(sql)
            .bind(monitor_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("monitor {monitor_id}")))?;
        row.try_into()
    }

    async fn delete_monitor(&self, monitor_id: MonitorId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = $1")
            .bind(monitor_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StoreError> {
        let row = sqlx::query_as::<_, MonitorRow>(concat!(
            "SELECT ",
            monitor_columns!(),
            " FROM monitors WHERE id = $1"
        ))
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Monitor::try_from).transpose()
    }

    async fn list_monitors_for_user(&self, user_id: i64) -> Result<Vec<Monitor>, StoreError> {
        let rows = sqlx::query_as::<_, MonitorRow>(concat!(
            "SELECT ",
            monitor_columns!(),
            " FROM monitors WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn create_alert_config(
        &self,
        new: NewAlertConfiguration,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        new.validate()?;
        let monitor_id = new.monitor_id;
        let row = sqlx::query_as::<_, AlertConfigRow>(concat!(
            r#"
            INSERT INTO alert_configurations (
                monitor_id, alert_type, destination, enabled, failure_threshold,
                recovery_threshold, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING "#,
            alert_config_columns!()
        ))
        .bind(new.monitor_id)
        .bind(new.alert_type.as_str())
        .bind(new.destination)
        .bind(new.enabled)
        .bind(new.failure_threshold)
        .bind(new.recovery_threshold)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, monitor_id))?;
        row.try_into()
    }

    async fn update_alert_config(
        &self,
        alert_config_id: AlertConfigId,
        changes: AlertConfigurationChanges,
        now: DateTime<Utc>,
    ) -> Result<AlertConfiguration, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, AlertConfigRow>(concat!(
            "SELECT ",
            alert_config_columns!(),
            " FROM alert_configurations WHERE id = $1 FOR UPDATE"
        ))
        .bind(alert_config_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("alert configuration {alert_config_id}")))?;

        let mut config = AlertConfiguration::try_from(row)?;
        changes.apply_to(&mut config)?;

        let row = sqlx::query_as::<_, AlertConfigRow>(concat!(
            r#"
            UPDATE alert_configurations SET
                alert_type = $2, destination = $3, enabled = $4, failure_threshold = $5,
                recovery_threshold = $6, updated_at = $7
            WHERE id = $1
            RETURNING "#,
            alert_config_columns!()
        ))
        .bind(alert_config_id)
        .bind(config.alert_type.as_str())
        .bind(config.destination)
        .bind(config.enabled)
        .bind(config.failure_threshold)
        .bind(config.recovery_threshold)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn delete_alert_config(
        &self,
        alert_config_id: AlertConfigId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM alert_configurations WHERE id = $1")
            .bind(alert_config_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_alert_configs(
        &self,
        monitor_id: MonitorId,
    ) -> Result<Vec<AlertConfiguration>, StoreError> {
        let rows = sqlx::query_as::<_, AlertConfigRow>(concat!(
            "SELECT ",
            alert_config_columns!(),
            " FROM alert_configurations WHERE monitor_id = $1 ORDER BY id"
        ))
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}
