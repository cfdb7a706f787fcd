//! Funnel analysis — distinct sessions reaching each named step of a
//! scenario, and the drop-off between consecutive steps.
//!
//! Every percentage is relative to the entry step's count, never to the
//! preceding step, so the `pct_lost` values plus the final step's
//! `pct_of_entry` always add up to 100.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use stepline_core::DayRange;
use utoipa::ToSchema;

use crate::percent_of;
use crate::view::LocalizedEvent;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FunnelStepResult {
    pub name: String,
    pub count: u64,
    /// `None` when the entry step has no sessions.
    pub pct_of_entry: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Dropoff {
    pub from_step: String,
    pub to_step: String,
    /// `count[from] - count[to]`; negative when more sessions reach the
    /// later step.
    pub absolute: i64,
    /// `absolute` as a percentage of the entry step's count.
    pub pct_lost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FunnelReport {
    pub scenario: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub steps: Vec<FunnelStepResult>,
    pub dropoffs: Vec<Dropoff>,
    /// Events in the window that carried no session id.
    pub ungrouped_events: u64,
}

/// Per-day distinct-session count for one funnel step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FunnelRow {
    pub scenario: String,
    pub day: NaiveDate,
    pub step: String,
    pub distinct_session_count: u64,
}

/// Distinct session ids per step. Events without a session id are skipped.
pub fn sessions_by_step(events: &[LocalizedEvent]) -> HashMap<&str, HashSet<&str>> {
    let mut by_step: HashMap<&str, HashSet<&str>> = HashMap::new();
    for localized in events {
        if let Some(session_id) = localized.session_id() {
            by_step
                .entry(localized.event.step.as_str())
                .or_default()
                .insert(session_id);
        }
    }
    by_step
}

/// Count of events that cannot be attributed to any session.
pub fn ungrouped_count(events: &[LocalizedEvent]) -> u64 {
    events.iter().filter(|e| e.session_id().is_none()).count() as u64
}

/// Build the funnel for `steps` from the scenario's events in `range`.
pub fn build_funnel(
    scenario: &str,
    range: DayRange,
    steps: &[String],
    events: &[LocalizedEvent],
) -> FunnelReport {
    let by_step = sessions_by_step(events);
    let counts: Vec<u64> = steps
        .iter()
        .map(|step| by_step.get(step.as_str()).map_or(0, |s| s.len() as u64))
        .collect();
    let entry = counts.first().copied().unwrap_or(0);

    let step_results = steps
        .iter()
        .zip(&counts)
        .map(|(name, &count)| FunnelStepResult {
            name: name.clone(),
            count,
            pct_of_entry: percent_of(count as f64, entry),
        })
        .collect();

    let dropoffs = steps
        .windows(2)
        .zip(counts.windows(2))
        .map(|(names, pair)| {
            let absolute = pair[0] as i64 - pair[1] as i64;
            Dropoff {
                from_step: names[0].clone(),
                to_step: names[1].clone(),
                absolute,
                pct_lost: percent_of(absolute as f64, entry),
            }
        })
        .collect();

    FunnelReport {
        scenario: scenario.to_string(),
        from: range.from,
        to: range.to,
        steps: step_results,
        dropoffs,
        ungrouped_events: ungrouped_count(events),
    }
}

/// One row per `(day, step)` for every day in `range`, zero-filled.
pub fn daily_rows(
    scenario: &str,
    range: DayRange,
    steps: &[String],
    events: &[LocalizedEvent],
) -> Vec<FunnelRow> {
    let mut sessions: HashMap<(NaiveDate, &str), HashSet<&str>> = HashMap::new();
    for localized in events {
        if let Some(session_id) = localized.session_id() {
            sessions
                .entry((localized.day, localized.event.step.as_str()))
                .or_default()
                .insert(session_id);
        }
    }

    range
        .days()
        .flat_map(|day| {
            let sessions = &sessions;
            steps.iter().map(move |step| FunnelRow {
                scenario: scenario.to_string(),
                day,
                step: step.clone(),
                distinct_session_count: sessions
                    .get(&(day, step.as_str()))
                    .map_or(0, |s| s.len() as u64),
            })
        })
        .collect()
}

/// Observed steps not named in `listed`, with their distinct-session counts.
/// A step seen only on events without a session id reports 0.
pub fn unlisted_steps(events: &[LocalizedEvent], listed: &[String]) -> BTreeMap<String, u64> {
    let listed: HashSet<&str> = listed.iter().map(String::as_str).collect();
    let by_step = sessions_by_step(events);
    events
        .iter()
        .map(|e| e.event.step.as_str())
        .filter(|step| !listed.contains(step))
        .collect::<HashSet<&str>>()
        .into_iter()
        .map(|step| (step.to_string(), by_step.get(step).map_or(0, |s| s.len() as u64)))
        .collect()
}
