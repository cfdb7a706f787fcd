//! Attribute aggregation — distribution of a metadata attribute across the
//! events of one `(scenario, step)` pair, bucketed by day.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use stepline_core::types::attribute_key;
use stepline_core::UserId;
use utoipa::ToSchema;

use crate::view::LocalizedEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttributeRow {
    pub day: NaiveDate,
    pub value: String,
    pub draw_count: u64,
    pub distinct_user_count: u64,
}

#[derive(Default)]
struct Bucket {
    draws: u64,
    users: HashSet<UserId>,
}

/// Group events by `(day, value at path)`. Events where the attribute is
/// missing, composite or unreadable are left out of this aggregate only.
///
/// Rows are ordered by day, then value.
pub fn attribute_rows(events: &[LocalizedEvent], path: &str) -> Vec<AttributeRow> {
    let mut buckets: BTreeMap<(NaiveDate, String), Bucket> = BTreeMap::new();

    for localized in events {
        let Some(value) = localized
            .event
            .metadata_path(path)
            .as_ref()
            .and_then(attribute_key)
        else {
            continue;
        };
        let bucket = buckets.entry((localized.day, value)).or_default();
        bucket.draws += 1;
        bucket.users.insert(localized.event.user_id);
    }

    buckets
        .into_iter()
        .map(|((day, value), bucket)| AttributeRow {
            day,
            value,
            draw_count: bucket.draws,
            distinct_user_count: bucket.users.len() as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use stepline_core::{parse_day, NewEvent, ReportingOffset, StepEvent};

    fn ev(user_id: i64, metadata: Value, ts: &str) -> LocalizedEvent {
        let occurred_at = DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc);
        LocalizedEvent {
            day: ReportingOffset::utc().day_of(occurred_at),
            event: Arc::new(StepEvent::from_new(
                0,
                NewEvent {
                    scenario: "card_of_day".into(),
                    step: "card_drawn".into(),
                    user_id,
                    metadata,
                    occurred_at,
                },
            )),
        }
    }

    #[test]
    fn test_draws_and_distinct_users_per_value() {
        let events = vec![
            ev(1, json!({"deck": "classic"}), "2024-05-01T10:00:00Z"),
            ev(1, json!({"deck": "classic"}), "2024-05-01T11:00:00Z"),
            ev(2, json!({"deck": "classic"}), "2024-05-01T12:00:00Z"),
            ev(2, json!({"deck": "tarot"}), "2024-05-01T12:30:00Z"),
            ev(3, json!({"deck": "tarot"}), "2024-05-02T09:00:00Z"),
        ];
        let rows = attribute_rows(&events, "deck");
        assert_eq!(
            rows,
            vec![
                AttributeRow {
                    day: parse_day("2024-05-01").unwrap(),
                    value: "classic".into(),
                    draw_count: 3,
                    distinct_user_count: 2,
                },
                AttributeRow {
                    day: parse_day("2024-05-01").unwrap(),
                    value: "tarot".into(),
                    draw_count: 1,
                    distinct_user_count: 1,
                },
                AttributeRow {
                    day: parse_day("2024-05-02").unwrap(),
                    value: "tarot".into(),
                    draw_count: 1,
                    distinct_user_count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_missing_and_malformed_attributes_are_skipped() {
        let events = vec![
            ev(1, json!({}), "2024-05-01T10:00:00Z"),
            ev(2, json!("not json at all"), "2024-05-01T10:00:00Z"),
            ev(3, json!({"deck": null}), "2024-05-01T10:00:00Z"),
            ev(4, json!({"deck": ["a", "b"]}), "2024-05-01T10:00:00Z"),
            ev(5, json!(r#"{"deck":"legacy"}"#), "2024-05-01T10:00:00Z"),
        ];
        let rows = attribute_rows(&events, "deck");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "legacy");
    }

    #[test]
    fn test_nested_path_and_scalar_rendering() {
        let events = vec![
            ev(1, json!({"card": {"rank": 7}}), "2024-05-01T10:00:00Z"),
            ev(2, json!({"card": {"rank": 7}}), "2024-05-01T10:00:00Z"),
            ev(3, json!({"card": {"reversed": true}}), "2024-05-01T10:00:00Z"),
        ];
        let ranks = attribute_rows(&events, "card.rank");
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks[0].value, "7");
        assert_eq!(ranks[0].distinct_user_count, 2);

        let reversed = attribute_rows(&events, "card.reversed");
        assert_eq!(reversed[0].value, "true");
    }
}
