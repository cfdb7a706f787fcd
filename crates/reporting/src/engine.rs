//! Query facade over the event log and the exclusion registry.
//!
//! Each query takes exactly one registry snapshot and threads its offset and
//! exclusion set through the whole computation, so a concurrent
//! administrative change is seen either entirely or not at all.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use stepline_core::{DayRange, StepResult};
use stepline_store::{EventLog, ExclusionRegistry, RegistrySnapshot};
use tracing::debug;
use utoipa::ToSchema;

use crate::attributes::{self, AttributeRow};
use crate::dau;
use crate::funnel::{self, FunnelReport, FunnelRow};
use crate::sessions::{Session, SessionReconstructor, SessionSummary};
use crate::view::{LocalizedView, QueryOptions};

/// Sessions that started on one day, with their completion summary.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionsReport {
    pub scenario: String,
    pub day: NaiveDate,
    pub sessions: Vec<Session>,
    pub summary: SessionSummary,
}

pub struct AnalyticsEngine {
    log: Arc<dyn EventLog>,
    registry: Arc<ExclusionRegistry>,
    default_terminal_steps: Vec<String>,
}

impl AnalyticsEngine {
    pub fn new(
        log: Arc<dyn EventLog>,
        registry: Arc<ExclusionRegistry>,
        default_terminal_steps: Vec<String>,
    ) -> Self {
        Self {
            log,
            registry,
            default_terminal_steps,
        }
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn registry(&self) -> &Arc<ExclusionRegistry> {
        &self.registry
    }

    pub fn default_terminal_steps(&self) -> &[String] {
        &self.default_terminal_steps
    }

    fn begin(&self, kind: &'static str) -> (RegistrySnapshot, Instant) {
        metrics::counter!("reporting.queries", "kind" => kind).increment(1);
        (self.registry.snapshot(), Instant::now())
    }

    fn view<'a>(&'a self, snapshot: &'a RegistrySnapshot, options: QueryOptions) -> LocalizedView<'a> {
        LocalizedView::new(self.log.as_ref(), snapshot, options)
    }

    /// Distinct active users on `day`, across all scenarios.
    pub fn dau(&self, day: NaiveDate, options: QueryOptions) -> StepResult<u64> {
        let series = self.dau_series("dau", DayRange::single(day), options)?;
        Ok(series.get(&day).copied().unwrap_or(0))
    }

    pub fn dau_range(
        &self,
        range: DayRange,
        options: QueryOptions,
    ) -> StepResult<BTreeMap<NaiveDate, u64>> {
        self.dau_series("dau_range", range, options)
    }

    /// Mean DAU over the range; days without activity count as 0.
    pub fn average_dau(&self, range: DayRange, options: QueryOptions) -> StepResult<f64> {
        let series = self.dau_series("average_dau", range, options)?;
        Ok(dau::average(&series))
    }

    fn dau_series(
        &self,
        kind: &'static str,
        range: DayRange,
        options: QueryOptions,
    ) -> StepResult<BTreeMap<NaiveDate, u64>> {
        let (snapshot, started) = self.begin(kind);
        let events = self.view(&snapshot, options).events(range, None, None)?;
        let series = dau::daily_active_users(&events, range);
        debug!(
            kind,
            days = series.len(),
            scanned = events.len(),
            offset = %snapshot.offset,
            elapsed_us = started.elapsed().as_micros() as u64,
            "DAU query completed"
        );
        Ok(series)
    }

    pub fn funnel(
        &self,
        scenario: &str,
        range: DayRange,
        steps: &[String],
        options: QueryOptions,
    ) -> StepResult<FunnelReport> {
        let (snapshot, started) = self.begin("funnel");
        let events = self
            .view(&snapshot, options)
            .events(range, Some(scenario), None)?;
        let report = funnel::build_funnel(scenario, range, steps, &events);
        debug!(
            scenario,
            steps = steps.len(),
            scanned = events.len(),
            ungrouped = report.ungrouped_events,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Funnel query completed"
        );
        Ok(report)
    }

    pub fn funnel_daily(
        &self,
        scenario: &str,
        range: DayRange,
        steps: &[String],
        options: QueryOptions,
    ) -> StepResult<Vec<FunnelRow>> {
        let (snapshot, started) = self.begin("funnel_daily");
        let events = self
            .view(&snapshot, options)
            .events(range, Some(scenario), None)?;
        let rows = funnel::daily_rows(scenario, range, steps, &events);
        debug!(
            scenario,
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Daily funnel query completed"
        );
        Ok(rows)
    }

    /// Observed steps of `scenario` that are not in `listed`.
    pub fn unlisted_steps(
        &self,
        scenario: &str,
        range: DayRange,
        listed: &[String],
        options: QueryOptions,
    ) -> StepResult<BTreeMap<String, u64>> {
        let (snapshot, started) = self.begin("unlisted_steps");
        let events = self
            .view(&snapshot, options)
            .events(range, Some(scenario), None)?;
        let steps = funnel::unlisted_steps(&events, listed);
        debug!(
            scenario,
            unlisted = steps.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Unlisted steps query completed"
        );
        Ok(steps)
    }

    pub fn ungrouped_event_count(
        &self,
        scenario: &str,
        range: DayRange,
        options: QueryOptions,
    ) -> StepResult<u64> {
        let (snapshot, _) = self.begin("ungrouped");
        let events = self
            .view(&snapshot, options)
            .events(range, Some(scenario), None)?;
        Ok(funnel::ungrouped_count(&events))
    }

    /// Sessions of `scenario` whose first event falls on `day`.
    ///
    /// Every event of a candidate session is loaded, so a session started on
    /// `day` keeps its later events and a session with an earlier event is
    /// not reported for `day`. An empty `terminal_steps` uses the
    /// configured default terminal set.
    pub fn sessions(
        &self,
        scenario: &str,
        day: NaiveDate,
        terminal_steps: &[String],
        options: QueryOptions,
    ) -> StepResult<SessionsReport> {
        let (snapshot, started) = self.begin("sessions");
        let view = self.view(&snapshot, options);

        let mut candidates: Vec<String> = view
            .events(DayRange::single(day), Some(scenario), None)?
            .iter()
            .filter_map(|e| e.session_id().map(str::to_string))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let terminal = if terminal_steps.is_empty() {
            self.default_terminal_steps.as_slice()
        } else {
            terminal_steps
        };
        let reconstructor = SessionReconstructor::new(terminal.iter().cloned());
        let events = view.session_events(scenario, &candidates)?;
        let sessions: Vec<Session> = reconstructor
            .reconstruct(&events)
            .sessions
            .into_iter()
            .filter(|s| s.started_day == day)
            .collect();
        let summary = SessionSummary::from_sessions(&sessions);

        debug!(
            scenario,
            %day,
            candidates = candidates.len(),
            sessions = summary.total,
            completed = summary.completed,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Sessions query completed"
        );
        Ok(SessionsReport {
            scenario: scenario.to_string(),
            day,
            sessions,
            summary,
        })
    }

    pub fn attribute_stats(
        &self,
        scenario: &str,
        step: &str,
        path: &str,
        range: DayRange,
        options: QueryOptions,
    ) -> StepResult<Vec<AttributeRow>> {
        let (snapshot, started) = self.begin("attributes");
        let events = self
            .view(&snapshot, options)
            .events(range, Some(scenario), Some(step))?;
        let rows = attributes::attribute_rows(&events, path);
        debug!(
            scenario,
            step,
            path,
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Attribute query completed"
        );
        Ok(rows)
    }
}
