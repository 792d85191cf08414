//! Health check execution: one probe per claimed monitor, always yielding a result.

pub mod classify;
pub mod executor;
pub mod http;
pub mod ping;
pub mod tcp;

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::db::enums::ErrorCategory;
use crate::db::models::{LatencyBreakdown, MonitorId, NewCheckResult};

pub use executor::{execute_check, HealthCheckExecutor, Prober};

/// What a single probe observed, before it is tied to a monitor and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub is_up: bool,
    pub http_status: Option<i32>,
    pub response_time_ms: i64,
    pub latency: Option<LatencyBreakdown>,
    pub response_size_bytes: Option<i64>,
    pub error_category: ErrorCategory,
    pub error_message: Option<String>,
}

impl ProbeOutcome {
    pub fn up(response_time_ms: i64) -> Self {
        Self {
            is_up: true,
            http_status: None,
            response_time_ms,
            latency: None,
            response_size_bytes: None,
            error_category: ErrorCategory::None,
            error_message: None,
        }
    }

    /// A failed probe with `http_status` filled in from the category.
    pub fn failed(category: ErrorCategory, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            is_up: false,
            http_status: classify::failure_status(category),
            response_time_ms: millis(elapsed),
            latency: None,
            response_size_bytes: None,
            error_category: category,
            error_message: Some(message.into()),
        }
    }

    pub fn into_check(self, monitor_id: MonitorId, checked_at: DateTime<Utc>) -> NewCheckResult {
        NewCheckResult {
            monitor_id,
            checked_at,
            is_up: self.is_up,
            http_status: self.http_status,
            response_time_ms: self.response_time_ms,
            latency: self.latency,
            response_size_bytes: self.response_size_bytes,
            error_category: self.error_category,
            error_message: self.error_message,
        }
    }
}

pub(crate) fn millis(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
