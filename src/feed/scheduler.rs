//! Refresh scheduling.

use chrono::{DateTime, Utc};

use super::types::{Feed, LastUpdateRecord};

/// Decide whether `feed` should be fetched at `now`.
///
/// A feed is due when forced, when it was never attempted, or when its
/// update interval has fully elapsed since the last attempt. Failed
/// attempts count as attempts, so a broken feed is retried one interval
/// later.
pub fn is_due(
    feed: &Feed,
    last_update: Option<&LastUpdateRecord>,
    now: DateTime<Utc>,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    match last_update {
        None => true,
        Some(record) => record.updated + feed.update_interval < now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HookCommands;
    use chrono::{Duration, TimeZone};

    fn feed() -> Feed {
        Feed {
            key: "news".to_string(),
            title: "News".to_string(),
            url: "https://example.com/feed".to_string(),
            update_interval: Duration::hours(1),
            accept_bozo: false,
            hooks: HookCommands::default(),
        }
    }

    fn record(updated: DateTime<Utc>, success: bool) -> LastUpdateRecord {
        LastUpdateRecord {
            feed: "news".to_string(),
            updated,
            success,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_never_updated_is_due() {
        assert!(is_due(&feed(), None, now(), false));
    }

    #[test]
    fn test_recent_update_is_not_due() {
        let last = record(now() - Duration::minutes(10), true);
        assert!(!is_due(&feed(), Some(&last), now(), false));
    }

    #[test]
    fn test_elapsed_interval_is_due() {
        let last = record(now() - Duration::minutes(61), true);
        assert!(is_due(&feed(), Some(&last), now(), false));
    }

    #[test]
    fn test_exact_interval_is_not_due() {
        let last = record(now() - Duration::hours(1), true);
        assert!(!is_due(&feed(), Some(&last), now(), false));
    }

    #[test]
    fn test_failed_attempt_waits_full_interval() {
        let last = record(now() - Duration::minutes(5), false);
        assert!(!is_due(&feed(), Some(&last), now(), false));
    }

    #[test]
    fn test_force_overrides_schedule() {
        let last = record(now(), true);
        assert!(is_due(&feed(), Some(&last), now(), true));
        assert!(is_due(&feed(), None, now(), true));
    }
}
