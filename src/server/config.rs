use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::alerting::AlertingSettings;
use crate::checks::executor::PROBE_GRACE;
use crate::db::enums::{AlertType, MonitorType};
use crate::db::models::{NewAlertConfiguration, NewMonitor, DEFAULT_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS};
use crate::notifications::senders::email::{SmtpSettings, DEFAULT_SMTP_PORT};
use crate::notifications::NotificationSettings;
use crate::scheduler::SchedulerConfig;

pub const ENV_PREFIX: &str = "WATCHDOG_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` runs the engine on the in-memory store.
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    pub tick_interval_ms: u64,
    pub max_concurrent_checks: usize,
    pub claim_lease_seconds: u64,
    pub default_timeout_seconds: i32,
    pub alert_throttle_minutes: i64,
    pub notification_timeout_seconds: u64,
    pub log_dir: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_from: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub webhook_body_template: Option<String>,
    pub monitors: Vec<MonitorSeed>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    max_db_connections: Option<u32>,
    tick_interval_ms: Option<u64>,
    max_concurrent_checks: Option<usize>,
    claim_lease_seconds: Option<u64>,
    default_timeout_seconds: Option<i32>,
    alert_throttle_minutes: Option<i64>,
    notification_timeout_seconds: Option<u64>,
    log_dir: Option<String>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_from: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    telegram_bot_token: Option<String>,
    webhook_body_template: Option<String>,
}

/// Only the file may declare monitors to seed.
#[derive(Deserialize, Default, Debug)]
struct FileConfig {
    #[serde(flatten)]
    settings: PartialServerConfig,
    #[serde(default)]
    monitors: Vec<MonitorSeed>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MonitorSeed {
    #[serde(default)]
    pub user_id: i64,
    pub url: String,
    pub monitor_type: MonitorType,
    pub check_interval_seconds: i32,
    pub timeout_seconds: Option<i32>,
    pub content_match: Option<String>,
    pub http_method: Option<String>,
    pub http_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub alerts: Vec<AlertSeed>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AlertSeed {
    pub alert_type: AlertType,
    pub destination: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i32,
    pub recovery_threshold: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

fn default_failure_threshold() -> i32 {
    1
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_smtp_from() -> String {
    "watchdog@localhost".to_string()
}

impl MonitorSeed {
    pub fn to_new_monitor(&self, default_timeout_seconds: i32) -> NewMonitor {
        NewMonitor {
            user_id: self.user_id,
            url: self.url.clone(),
            monitor_type: self.monitor_type,
            check_interval_seconds: self.check_interval_seconds,
            timeout_seconds: Some(self.timeout_seconds.unwrap_or(default_timeout_seconds)),
            content_match: self.content_match.clone(),
            http_method: self.http_method.clone(),
            http_headers: self.http_headers.clone(),
        }
    }
}

impl AlertSeed {
    pub fn to_new_alert(&self, monitor_id: i64) -> NewAlertConfiguration {
        NewAlertConfiguration {
            monitor_id,
            alert_type: self.alert_type,
            destination: self.destination.clone(),
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
        }
    }
}

impl ServerConfig {
    /// Layers the optional TOML file, `.env`, and `WATCHDOG_`-prefixed
    /// environment variables; the environment wins. `DATABASE_URL` is also
    /// honoured without the prefix.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_contents = match config_path {
            Some(path_str) => {
                let path = Path::new(path_str);
                if path.exists() {
                    Some(fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?)
                } else {
                    None
                }
            }
            None => None,
        };
        Self::from_sources(file_contents.as_deref(), std::env::vars())
    }

    pub fn from_sources<I>(file_contents: Option<&str>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // 1. File (optional)
        let file_config: FileConfig = match file_contents {
            Some(contents) => toml::from_str(contents)?,
            None => FileConfig::default(),
        };

        // 2. Environment
        let env: Vec<(String, String)> = env.into_iter().collect();
        let plain_database_url = env
            .iter()
            .find(|(key, _)| key == "DATABASE_URL")
            .map(|(_, value)| value.clone());
        let env_config: PartialServerConfig = envy::prefixed(ENV_PREFIX).from_iter(env)?;

        // 3. Merge: environment overrides file
        let file = file_config.settings;
        let config = ServerConfig {
            database_url: env_config
                .database_url
                .or(plain_database_url)
                .or(file.database_url)
                .filter(|url| !url.trim().is_empty()),
            max_db_connections: env_config
                .max_db_connections
                .or(file.max_db_connections)
                .unwrap_or(10),
            tick_interval_ms: env_config
                .tick_interval_ms
                .or(file.tick_interval_ms)
                .unwrap_or(2000),
            max_concurrent_checks: env_config
                .max_concurrent_checks
                .or(file.max_concurrent_checks)
                .unwrap_or(16),
            claim_lease_seconds: env_config
                .claim_lease_seconds
                .or(file.claim_lease_seconds)
                .unwrap_or(120),
            default_timeout_seconds: env_config
                .default_timeout_seconds
                .or(file.default_timeout_seconds)
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            alert_throttle_minutes: env_config
                .alert_throttle_minutes
                .or(file.alert_throttle_minutes)
                .unwrap_or(60),
            notification_timeout_seconds: env_config
                .notification_timeout_seconds
                .or(file.notification_timeout_seconds)
                .unwrap_or(10),
            log_dir: env_config
                .log_dir
                .or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            smtp_host: env_config.smtp_host.or(file.smtp_host),
            smtp_port: env_config
                .smtp_port
                .or(file.smtp_port)
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_from: env_config
                .smtp_from
                .or(file.smtp_from)
                .unwrap_or_else(default_smtp_from),
            smtp_user: env_config.smtp_user.or(file.smtp_user),
            smtp_password: env_config.smtp_password.or(file.smtp_password),
            telegram_bot_token: env_config.telegram_bot_token.or(file.telegram_bot_token),
            webhook_body_template: env_config
                .webhook_body_template
                .or(file.webhook_body_template),
            monitors: file_config.monitors,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.max_concurrent_checks == 0 {
            return Err(ConfigError::Invalid("max_concurrent_checks must be at least 1".into()));
        }
        let min_lease = self.min_claim_lease_seconds();
        if self.claim_lease_seconds <= min_lease {
            return Err(ConfigError::Invalid(format!(
                "claim_lease_seconds must exceed {min_lease} (longest probe plus one notification send)"
            )));
        }
        if !(1..=MAX_TIMEOUT_SECONDS).contains(&self.default_timeout_seconds) {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS}"
            )));
        }
        if self.alert_throttle_minutes < 0 {
            return Err(ConfigError::Invalid("alert_throttle_minutes must not be negative".into()));
        }
        Ok(())
    }

    /// Longest probe the executor allows plus one bounded send.
    fn min_claim_lease_seconds(&self) -> u64 {
        MAX_TIMEOUT_SECONDS as u64 + PROBE_GRACE.as_secs() + self.notification_timeout_seconds
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            max_concurrent_checks: self.max_concurrent_checks,
            claim_lease: Duration::from_secs(self.claim_lease_seconds),
            ..SchedulerConfig::default()
        }
    }

    pub fn alerting_settings(&self) -> AlertingSettings {
        AlertingSettings {
            throttle_window: chrono::Duration::minutes(self.alert_throttle_minutes),
            send_timeout: Duration::from_secs(self.notification_timeout_seconds),
        }
    }

    pub fn notification_settings(&self) -> NotificationSettings {
        NotificationSettings {
            smtp: self.smtp_host.as_ref().map(|host| SmtpSettings {
                host: host.clone(),
                port: self.smtp_port,
                from_address: self.smtp_from.clone(),
                user: self.smtp_user.clone(),
                password: self.smtp_password.clone(),
            }),
            telegram_bot_token: self.telegram_bot_token.clone(),
            webhook_body_template: self.webhook_body_template.clone(),
        }
    }
}
