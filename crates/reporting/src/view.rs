//! Localized event view — the query-time projection every aggregate reads.
//!
//! Drops events from excluded users and annotates each remaining event with
//! its calendar day in the snapshot's reporting offset. Nothing here is
//! materialized, so registry changes apply to all history immediately.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use stepline_core::{DayRange, ReportingOffset, StepEvent, StepResult};
use stepline_store::{EventLog, RegistrySnapshot, ScanFilter};

/// Per-query switches shared by every report.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct QueryOptions {
    /// Bypass the exclusion registry (audits).
    #[serde(default)]
    pub include_excluded: bool,
}

impl QueryOptions {
    pub fn audit() -> Self {
        Self {
            include_excluded: true,
        }
    }
}

/// A stored event with its day bucket in the reporting offset.
#[derive(Debug, Clone)]
pub struct LocalizedEvent {
    pub event: Arc<StepEvent>,
    pub day: NaiveDate,
}

impl LocalizedEvent {
    pub fn session_id(&self) -> Option<&str> {
        self.event.session_id.as_deref()
    }
}

pub struct LocalizedView<'a> {
    log: &'a dyn EventLog,
    snapshot: &'a RegistrySnapshot,
    options: QueryOptions,
}

impl<'a> LocalizedView<'a> {
    pub fn new(log: &'a dyn EventLog, snapshot: &'a RegistrySnapshot, options: QueryOptions) -> Self {
        Self {
            log,
            snapshot,
            options,
        }
    }

    pub fn offset(&self) -> ReportingOffset {
        self.snapshot.offset
    }

    /// Annotate an event, or drop it if its user is excluded.
    pub fn localize(&self, event: Arc<StepEvent>) -> Option<LocalizedEvent> {
        if !self.options.include_excluded && self.snapshot.is_excluded(event.user_id) {
            return None;
        }
        let day = self.snapshot.offset.day_of(event.occurred_at);
        Some(LocalizedEvent { event, day })
    }

    /// Visible events whose day bucket falls in `range`, ordered by
    /// `occurred_at`.
    pub fn events(
        &self,
        range: DayRange,
        scenario: Option<&str>,
        step: Option<&str>,
    ) -> StepResult<Vec<LocalizedEvent>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let (from, to) = range.utc_window(self.snapshot.offset);
        let mut filter = ScanFilter::all().between(from, to);
        filter.scenario = scenario.map(str::to_string);
        filter.step = step.map(str::to_string);

        Ok(self
            .log
            .scan(&filter)?
            .into_iter()
            .filter_map(|event| self.localize(event))
            .collect())
    }

    /// Every visible event of the given sessions, across all time.
    pub fn session_events(
        &self,
        scenario: &str,
        session_ids: &[String],
    ) -> StepResult<Vec<LocalizedEvent>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .log
            .session_events(scenario, session_ids)?
            .into_iter()
            .filter_map(|event| self.localize(event))
            .collect())
    }
}
