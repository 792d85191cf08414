use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::enums::{AlertOutcome, AlertType, ErrorCategory, MonitorStatus, MonitorType};

pub type MonitorId = i64;
pub type AlertConfigId = i64;

pub const MIN_CHECK_INTERVAL_SECONDS: i32 = 30;
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 10;
pub const MAX_TIMEOUT_SECONDS: i32 = 60;

/// `http_status` recorded when the probe never got an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: i32 = -1;
/// `http_status` recorded when the failure could not be classified.
pub const UNKNOWN_FAILURE_STATUS: i32 = -2;

const SUPPORTED_HTTP_METHODS: [&str; 3] = ["GET", "HEAD", "POST"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Check interval must be at least 30 seconds, got {0}")]
    IntervalTooShort(i32),
    #[error("Timeout must be between 1 and 60 seconds, got {0}")]
    TimeoutOutOfRange(i32),
    #[error("Target must not be empty")]
    EmptyTarget,
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Failure threshold must be at least 1, got {0}")]
    FailureThresholdTooLow(i32),
    #[error("Recovery threshold must not be negative, got {0}")]
    NegativeRecoveryThreshold(i32),
    #[error("Alert destination must not be empty")]
    EmptyDestination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: MonitorId,
    pub user_id: i64,
    pub url: String,
    pub monitor_type: MonitorType,
    pub check_interval_seconds: i32,
    pub timeout_seconds: i32,
    pub status: MonitorStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    pub content_match: Option<String>,
    pub http_method: Option<String>,
    pub http_headers: Option<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.check_interval_seconds))
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        let secs = self.timeout_seconds.clamp(1, MAX_TIMEOUT_SECONDS);
        std::time::Duration::from_secs(secs as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitor {
    pub user_id: i64,
    pub url: String,
    pub monitor_type: MonitorType,
    pub check_interval_seconds: i32,
    #[serde(default)]
    pub timeout_seconds: Option<i32>,
    #[serde(default)]
    pub content_match: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub http_headers: Option<HashMap<String, String>>,
}

impl NewMonitor {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_monitor_fields(
            &self.url,
            self.check_interval_seconds,
            self.timeout_seconds,
            self.http_method.as_deref(),
        )
    }
}

/// Partial update coming from the owner's config API. `None` leaves a field untouched;
/// for nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorChanges {
    pub url: Option<String>,
    pub monitor_type: Option<MonitorType>,
    pub check_interval_seconds: Option<i32>,
    pub timeout_seconds: Option<i32>,
    pub content_match: Option<Option<String>>,
    pub http_method: Option<Option<String>>,
    pub http_headers: Option<Option<HashMap<String, String>>>,
}

impl MonitorChanges {
    /// Applies the changes on top of `monitor`, validating the merged result.
    pub fn apply_to(&self, monitor: &mut Monitor) -> Result<(), ValidationError> {
        let mut merged = monitor.clone();
        if let Some(url) = &self.url {
            merged.url = url.clone();
        }
        if let Some(monitor_type) = self.monitor_type {
            merged.monitor_type = monitor_type;
        }
        if let Some(interval) = self.check_interval_seconds {
            merged.check_interval_seconds = interval;
        }
        if let Some(timeout) = self.timeout_seconds {
            merged.timeout_seconds = timeout;
        }
        if let Some(content_match) = &self.content_match {
            merged.content_match = content_match.clone();
        }
        if let Some(http_method) = &self.http_method {
            merged.http_method = http_method.clone();
        }
        if let Some(http_headers) = &self.http_headers {
            merged.http_headers = http_headers.clone();
        }
        validate_monitor_fields(
            &merged.url,
            merged.check_interval_seconds,
            Some(merged.timeout_seconds),
            merged.http_method.as_deref(),
        )?;
        *monitor = merged;
        Ok(())
    }
}

fn validate_monitor_fields(
    url: &str,
    interval: i32,
    timeout: Option<i32>,
    http_method: Option<&str>,
) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }
    if interval < MIN_CHECK_INTERVAL_SECONDS {
        return Err(ValidationError::IntervalTooShort(interval));
    }
    if let Some(timeout) = timeout {
        if !(1..=MAX_TIMEOUT_SECONDS).contains(&timeout) {
            return Err(ValidationError::TimeoutOutOfRange(timeout));
        }
    }
    if let Some(method) = http_method {
        if !SUPPORTED_HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str()) {
            return Err(ValidationError::UnsupportedMethod(method.to_string()));
        }
    }
    Ok(())
}

/// Per-phase timings of a probe. `exact` is false when any phase was derived
/// from a preflight connection or approximated from the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyBreakdown {
    pub dns_ms: Option<i64>,
    pub connect_ms: Option<i64>,
    pub ttfb_ms: Option<i64>,
    pub exact: bool,
}

impl LatencyBreakdown {
    /// Splits a total latency ¼ DNS, ¼ connect, ½ TTFB. Only an estimate.
    pub fn approximate(total_ms: i64) -> Self {
        Self {
            dns_ms: Some(total_ms / 4),
            connect_ms: Some(total_ms / 4),
            ttfb_ms: Some(total_ms / 2),
            exact: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCheckResult {
    pub monitor_id: MonitorId,
    pub checked_at: DateTime<Utc>,
    pub is_up: bool,
    pub http_status: Option<i32>,
    pub response_time_ms: i64,
    pub latency: Option<LatencyBreakdown>,
    pub response_size_bytes: Option<i64>,
    pub error_category: ErrorCategory,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: i64,
    pub monitor_id: MonitorId,
    pub checked_at: DateTime<Utc>,
    pub is_up: bool,
    pub http_status: Option<i32>,
    pub response_time_ms: i64,
    pub latency: Option<LatencyBreakdown>,
    pub response_size_bytes: Option<i64>,
    pub error_category: ErrorCategory,
    pub error_message: Option<String>,
}

impl CheckResult {
    pub fn from_new(id: i64, check: NewCheckResult) -> Self {
        Self {
            id,
            monitor_id: check.monitor_id,
            checked_at: check.checked_at,
            is_up: check.is_up,
            http_status: check.http_status,
            response_time_ms: check.response_time_ms,
            latency: check.latency,
            response_size_bytes: check.response_size_bytes,
            error_category: check.error_category,
            error_message: check.error_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfiguration {
    pub id: AlertConfigId,
    pub monitor_id: MonitorId,
    pub alert_type: AlertType,
    pub destination: String,
    pub enabled: bool,
    pub failure_threshold: i32,
    pub recovery_threshold: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertConfiguration {
    /// Recovery notifications are off when the threshold is null or zero.
    pub fn recovery_threshold(&self) -> Option<usize> {
        self.recovery_threshold
            .filter(|threshold| *threshold > 0)
            .map(|threshold| threshold as usize)
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold.max(1) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertConfiguration {
    pub monitor_id: MonitorId,
    pub alert_type: AlertType,
    pub destination: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub failure_threshold: i32,
    #[serde(default)]
    pub recovery_threshold: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

impl NewAlertConfiguration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_alert_fields(
            &self.destination,
            self.failure_threshold,
            self.recovery_threshold,
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigurationChanges {
    pub alert_type: Option<AlertType>,
    pub destination: Option<String>,
    pub enabled: Option<bool>,
    pub failure_threshold: Option<i32>,
    pub recovery_threshold: Option<Option<i32>>,
}

impl AlertConfigurationChanges {
    pub fn apply_to(&self, config: &mut AlertConfiguration) -> Result<(), ValidationError> {
        let mut merged = config.clone();
        if let Some(alert_type) = self.alert_type {
            merged.alert_type = alert_type;
        }
        if let Some(destination) = &self.destination {
            merged.destination = destination.clone();
        }
        if let Some(enabled) = self.enabled {
            merged.enabled = enabled;
        }
        if let Some(threshold) = self.failure_threshold {
            merged.failure_threshold = threshold;
        }
        if let Some(threshold) = self.recovery_threshold {
            merged.recovery_threshold = threshold;
        }
        validate_alert_fields(
            &merged.destination,
            merged.failure_threshold,
            merged.recovery_threshold,
        )?;
        *config = merged;
        Ok(())
    }
}

fn validate_alert_fields(
    destination: &str,
    failure_threshold: i32,
    recovery_threshold: Option<i32>,
) -> Result<(), ValidationError> {
    if destination.trim().is_empty() {
        return Err(ValidationError::EmptyDestination);
    }
    if failure_threshold < 1 {
        return Err(ValidationError::FailureThresholdTooLow(failure_threshold));
    }
    if let Some(threshold) = recovery_threshold {
        if threshold < 0 {
            return Err(ValidationError::NegativeRecoveryThreshold(threshold));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertHistoryEntry {
    pub monitor_id: MonitorId,
    pub alert_config_id: Option<AlertConfigId>,
    pub recorded_at: DateTime<Utc>,
    pub message: String,
    pub outcome: AlertOutcome,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub id: i64,
    pub monitor_id: MonitorId,
    pub alert_config_id: Option<AlertConfigId>,
    pub recorded_at: DateTime<Utc>,
    pub message: String,
    pub outcome: AlertOutcome,
    pub failure_reason: Option<String>,
}

impl AlertHistoryEntry {
    pub fn from_new(id: i64, entry: NewAlertHistoryEntry) -> Self {
        Self {
            id,
            monitor_id: entry.monitor_id,
            alert_config_id: entry.alert_config_id,
            recorded_at: entry.recorded_at,
            message: entry.message,
            outcome: entry.outcome,
            failure_reason: entry.failure_reason,
        }
    }
}

/// Inclusive time window for log reads; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 500;

    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}
