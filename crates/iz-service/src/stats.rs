//! Interception statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Answer to `getStats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_intercepted: u64,
    pub rules_active: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Counters fed by the live-intercept path.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    total_intercepted: AtomicU64,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, at: DateTime<Utc>) {
        self.total_intercepted.fetch_add(1, Ordering::Relaxed);
        let mut last = match self.last_activity.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.map_or(true, |prev| at >= prev) {
            *last = Some(at);
        }
    }

    pub fn snapshot(&self, rules_active: usize) -> Stats {
        let last_activity = match self.last_activity.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Stats {
            total_intercepted: self.total_intercepted.load(Ordering::Relaxed),
            rules_active,
            last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_fresh_stats() {
        let stats = StatsRecorder::new().snapshot(3);
        assert_eq!(stats.total_intercepted, 0);
        assert_eq!(stats.rules_active, 3);
        assert_eq!(stats.last_activity, None);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, serde_json::json!({"totalIntercepted": 0, "rulesActive": 3, "lastActivity": null}));
    }

    #[test]
    fn test_last_activity_never_moves_back() {
        let recorder = StatsRecorder::new();
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        recorder.record(later);
        recorder.record(earlier);

        let stats = recorder.snapshot(0);
        assert_eq!(stats.total_intercepted, 2);
        assert_eq!(stats.last_activity, Some(later));
    }
}
