use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::config::MonitorSeed;
use crate::db::store::{MonitorStore, StoreError};

/// Creates the monitors declared in the config file. A seed whose URL and
/// type already exist for the same user is left alone, so restarts against
/// a persistent store don't duplicate it.
#[instrument(skip_all, fields(seeds = seeds.len()))]
pub async fn seed_monitors(
    store: &dyn MonitorStore,
    seeds: &[MonitorSeed],
    default_timeout_seconds: i32,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut created = 0;
    for seed in seeds {
        let existing = store.list_monitors_for_user(seed.user_id).await?;
        if existing
            .iter()
            .any(|m| m.url == seed.url && m.monitor_type == seed.monitor_type)
        {
            continue;
        }

        let monitor = store
            .create_monitor(seed.to_new_monitor(default_timeout_seconds), now)
            .await?;
        for alert in &seed.alerts {
            store
                .create_alert_config(alert.to_new_alert(monitor.id), now)
                .await?;
        }
        if seed.paused {
            store.set_monitor_paused(monitor.id, true, now).await?;
        }
        info!(monitor_id = monitor.id, url = %monitor.url, alerts = seed.alerts.len(), "Seeded monitor.");
        created += 1;
    }
    Ok(created)
}
