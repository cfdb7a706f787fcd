//! Event log trait — the narrow ingestion and scan contract every storage
//! backend implements.
//!
//! Read-side components accept an `Arc<dyn EventLog>` so the in-memory log
//! can be swapped for a database-backed one without touching aggregation code.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use stepline_core::{EventId, NewEvent, StepEvent, StepResult};

/// Selection criteria for a log scan. Time bounds are `[from, to)`.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub scenario: Option<String>,
    pub step: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ScanFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// True when the time bounds cannot match anything.
    pub fn is_empty_window(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from >= to)
    }

    pub fn matches(&self, event: &StepEvent) -> bool {
        if let Some(scenario) = &self.scenario {
            if &event.scenario != scenario {
                return false;
            }
        }
        if let Some(step) = &self.step {
            if &event.step != step {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.occurred_at >= to {
                return false;
            }
        }
        true
    }
}

/// Append-only store of step events.
pub trait EventLog: Send + Sync {
    /// Store an event and return its newly assigned id. Well-formed calls
    /// are never rejected for business reasons.
    fn append(&self, event: NewEvent) -> StepResult<EventId>;

    /// Events matching `filter`, ordered by `(occurred_at, event_id)`.
    fn scan(&self, filter: &ScanFilter) -> StepResult<Vec<Arc<StepEvent>>>;

    /// Every event of the given sessions within `scenario`, across all time,
    /// ordered by `(occurred_at, event_id)`.
    fn session_events(
        &self,
        scenario: &str,
        session_ids: &[String],
    ) -> StepResult<Vec<Arc<StepEvent>>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
