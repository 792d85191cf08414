//! Pure decision rules for alert confirmation and throttling.

use chrono::{DateTime, Duration, Utc};

use crate::db::enums::AlertOutcome;
use crate::db::models::AlertHistoryEntry;

/// How many recent results to load to decide a streak of `required` checks.
pub fn fetch_size(required: usize) -> usize {
    required + 1
}

/// `recent` holds up/down flags newest first. True when the newest `required`
/// entries all equal `want_up` and the entry just before them breaks the
/// streak, so the streak is exactly `required` long and this is the check that
/// completed it. A missing older entry counts as a break unless
/// `require_prior_opposite` is set.
pub fn streak_confirmed(
    recent: &[bool],
    want_up: bool,
    required: usize,
    require_prior_opposite: bool,
) -> bool {
    if required == 0 || recent.len() < required {
        return false;
    }
    if !recent[..required].iter().all(|&is_up| is_up == want_up) {
        return false;
    }
    match recent.get(required) {
        Some(&prior) => prior != want_up,
        None => !require_prior_opposite,
    }
}

pub fn outage_confirmed(recent: &[bool], failure_threshold: usize) -> bool {
    streak_confirmed(recent, false, failure_threshold, false)
}

/// Recovery needs an actual preceding failure; a monitor that has only ever
/// been up never "recovers".
pub fn recovery_confirmed(recent: &[bool], recovery_threshold: usize) -> bool {
    streak_confirmed(recent, true, recovery_threshold, true)
}

/// A configuration is throttled while its latest history entry is a SENT
/// alert younger than `window`.
pub fn is_throttled(latest: Option<&AlertHistoryEntry>, now: DateTime<Utc>, window: Duration) -> bool {
    latest.is_some_and(|entry| entry.outcome == AlertOutcome::Sent && now - entry.recorded_at < window)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UP: bool = true;
    const DOWN: bool = false;

    fn entry(outcome: AlertOutcome, recorded_at: DateTime<Utc>) -> AlertHistoryEntry {
        AlertHistoryEntry {
            id: 1,
            monitor_id: 1,
            alert_config_id: Some(1),
            recorded_at,
            message: "Monitor x is DOWN!".to_string(),
            outcome,
            failure_reason: None,
        }
    }

    #[test]
    fn outage_fires_once_when_streak_reaches_threshold() {
        assert!(!outage_confirmed(&[DOWN], 3));
        assert!(!outage_confirmed(&[DOWN, DOWN], 3));
        assert!(outage_confirmed(&[DOWN, DOWN, DOWN], 3));
        assert!(outage_confirmed(&[DOWN, DOWN, DOWN, UP], 3));
        assert!(!outage_confirmed(&[DOWN, DOWN, DOWN, DOWN], 3));
        assert!(!outage_confirmed(&[DOWN, UP, DOWN, DOWN], 3));
    }

    #[test]
    fn threshold_one_fires_on_first_failure_only() {
        assert!(outage_confirmed(&[DOWN], 1));
        assert!(outage_confirmed(&[DOWN, UP], 1));
        assert!(!outage_confirmed(&[DOWN, DOWN], 1));
    }

    #[test]
    fn recovery_needs_prior_failure() {
        assert!(!recovery_confirmed(&[UP, UP], 2));
        assert!(recovery_confirmed(&[UP, UP, DOWN], 2));
        assert!(!recovery_confirmed(&[UP, DOWN, DOWN], 2));
        assert!(!recovery_confirmed(&[UP, UP, UP], 2));
    }

    #[test]
    fn zero_required_never_confirms() {
        assert!(!streak_confirmed(&[UP, DOWN], true, 0, true));
        assert!(!streak_confirmed(&[], false, 0, false));
    }

    #[test]
    fn fetch_size_includes_the_breaking_entry() {
        assert_eq!(fetch_size(3), 4);
    }

    #[test]
    fn throttle_only_after_recent_sent_alert() {
        let now = Utc::now();
        let window = Duration::minutes(60);
        assert!(!is_throttled(None, now, window));
        assert!(is_throttled(
            Some(&entry(AlertOutcome::Sent, now - Duration::minutes(59))),
            now,
            window
        ));
        assert!(!is_throttled(
            Some(&entry(AlertOutcome::Sent, now - Duration::minutes(61))),
            now,
            window
        ));
        assert!(!is_throttled(
            Some(&entry(AlertOutcome::Failed, now - Duration::minutes(1))),
            now,
            window
        ));
        assert!(!is_throttled(
            Some(&entry(AlertOutcome::Throttled, now - Duration::minutes(1))),
            now,
            window
        ));
    }
}
