//! Daily active users — distinct `user_id`s per day bucket.
//!
//! Counting is by user, never by event id, so replayed or duplicated events
//! never move the numbers.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use stepline_core::{DayRange, UserId};

use crate::view::LocalizedEvent;

/// Distinct users per day for every day in `range`; days without events
/// are present with 0.
pub fn daily_active_users(events: &[LocalizedEvent], range: DayRange) -> BTreeMap<NaiveDate, u64> {
    let mut users: BTreeMap<NaiveDate, HashSet<UserId>> =
        range.days().map(|day| (day, HashSet::new())).collect();

    for localized in events {
        if let Some(day_users) = users.get_mut(&localized.day) {
            day_users.insert(localized.event.user_id);
        }
    }

    users
        .into_iter()
        .map(|(day, set)| (day, set.len() as u64))
        .collect()
}

/// Unweighted mean of the per-day counts. An empty series averages to 0.
pub fn average(series: &BTreeMap<NaiveDate, u64>) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.values().sum::<u64>() as f64 / series.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use stepline_core::{parse_day, NewEvent, ReportingOffset, StepEvent};

    fn ev(id: u64, user_id: i64, scenario: &str, ts: &str) -> LocalizedEvent {
        let occurred_at = DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc);
        LocalizedEvent {
            day: ReportingOffset::utc().day_of(occurred_at),
            event: Arc::new(StepEvent::from_new(
                id,
                NewEvent {
                    scenario: scenario.into(),
                    step: "opened".into(),
                    user_id,
                    metadata: json!(null),
                    occurred_at,
                },
            )),
        }
    }

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_distinct_users_across_scenarios() {
        let events = vec![
            ev(1, 1, "card_of_day", "2024-05-01T08:00:00Z"),
            ev(2, 1, "quiz", "2024-05-01T09:00:00Z"),
            ev(3, 2, "quiz", "2024-05-01T09:00:00Z"),
            ev(4, 1, "quiz", "2024-05-02T09:00:00Z"),
        ];
        let series = daily_active_users(&events, DayRange::new(day("2024-05-01"), day("2024-05-02")));
        assert_eq!(series[&day("2024-05-01")], 2);
        assert_eq!(series[&day("2024-05-02")], 1);
    }

    #[test]
    fn test_duplicates_do_not_change_counts() {
        let once = vec![ev(1, 7, "quiz", "2024-05-01T08:00:00Z")];
        let twice = vec![
            ev(1, 7, "quiz", "2024-05-01T08:00:00Z"),
            ev(2, 7, "quiz", "2024-05-01T08:00:00Z"),
        ];
        let range = DayRange::single(day("2024-05-01"));
        assert_eq!(daily_active_users(&once, range), daily_active_users(&twice, range));
    }

    #[test]
    fn test_zero_days_count_toward_average() {
        let events = vec![
            ev(1, 1, "quiz", "2024-05-01T08:00:00Z"),
            ev(2, 2, "quiz", "2024-05-01T08:00:00Z"),
            ev(3, 3, "quiz", "2024-05-03T08:00:00Z"),
            ev(4, 4, "quiz", "2024-05-03T08:00:00Z"),
        ];
        let series = daily_active_users(&events, DayRange::new(day("2024-05-01"), day("2024-05-04")));
        assert_eq!(series.len(), 4);
        assert_eq!(series[&day("2024-05-02")], 0);
        assert!((average(&series) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_range() {
        let events = vec![ev(1, 1, "quiz", "2024-05-01T08:00:00Z")];
        let series = daily_active_users(&events, DayRange::new(day("2024-05-02"), day("2024-05-01")));
        assert!(series.is_empty());
        assert_eq!(average(&series), 0.0);
    }
}
