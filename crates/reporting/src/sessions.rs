//! Session reconstruction — groups events by `(scenario, session_id)`.
//!
//! Producers never emitted a distinguished start event, so a session starts
//! at its earliest event whatever that step is. Completion is a monotonic OR
//! over terminal-step events and there is no timeout: a session without a
//! terminal event stays open forever.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

use crate::view::LocalizedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Completed,
}

impl SessionState {
    /// `Completed` is absorbing; `Open` moves to `Completed` on a terminal step.
    pub fn observe(self, terminal: bool) -> Self {
        match (self, terminal) {
            (SessionState::Completed, _) => SessionState::Completed,
            (SessionState::Open, true) => SessionState::Completed,
            (SessionState::Open, false) => SessionState::Open,
        }
    }
}

/// A reconstructed scenario execution.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Session {
    pub scenario: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub started_day: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub state: SessionState,
    pub total_events: u64,
}

/// Completion figures over a set of sessions.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionSummary {
    pub total: u64,
    pub completed: u64,
    pub open: u64,
    /// Percentage of completed sessions; `None` when there are no sessions.
    pub completion_rate: Option<f64>,
}

impl SessionSummary {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let total = sessions.len() as u64;
        let completed = sessions.iter().filter(|s| s.is_completed).count() as u64;
        Self {
            total,
            completed,
            open: total - completed,
            completion_rate: crate::percent_of(completed as f64, total),
        }
    }
}

/// Output of one reconstruction pass.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub sessions: Vec<Session>,
    /// Events that carried no session id and were left out.
    pub ungrouped_events: u64,
}

struct SessionFold {
    started_at: DateTime<Utc>,
    started_day: NaiveDate,
    completed_at: Option<DateTime<Utc>>,
    state: SessionState,
    total_events: u64,
}

/// Folds localized events into sessions for a caller-supplied terminal set.
#[derive(Debug, Clone)]
pub struct SessionReconstructor {
    terminal_steps: HashSet<String>,
}

impl SessionReconstructor {
    pub fn new<I, S>(terminal_steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terminal_steps: terminal_steps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_terminal(&self, step: &str) -> bool {
        self.terminal_steps.contains(step)
    }

    /// Group events into sessions. Input order does not matter.
    pub fn reconstruct(&self, events: &[LocalizedEvent]) -> Reconstruction {
        let mut folds: HashMap<(&str, &str), SessionFold> = HashMap::new();
        let mut ungrouped_events = 0u64;

        for localized in events {
            let event = &localized.event;
            let Some(session_id) = event.session_id.as_deref() else {
                ungrouped_events += 1;
                continue;
            };
            let terminal = self.is_terminal(&event.step);

            let fold = folds
                .entry((event.scenario.as_str(), session_id))
                .or_insert_with(|| SessionFold {
                    started_at: event.occurred_at,
                    started_day: localized.day,
                    completed_at: None,
                    state: SessionState::Open,
                    total_events: 0,
                });

            fold.total_events += 1;
            if event.occurred_at < fold.started_at {
                fold.started_at = event.occurred_at;
                fold.started_day = localized.day;
            }
            fold.state = fold.state.observe(terminal);
            if terminal && fold.completed_at.map_or(true, |at| event.occurred_at > at) {
                fold.completed_at = Some(event.occurred_at);
            }
        }

        let mut sessions: Vec<Session> = folds
            .into_iter()
            .map(|((scenario, session_id), fold)| Session {
                scenario: scenario.to_string(),
                session_id: session_id.to_string(),
                started_at: fold.started_at,
                started_day: fold.started_day,
                completed_at: fold.completed_at,
                is_completed: fold.state == SessionState::Completed,
                state: fold.state,
                total_events: fold.total_events,
            })
            .collect();
        sessions.sort_by(|a, b| {
            (a.started_at, &a.scenario, &a.session_id).cmp(&(b.started_at, &b.scenario, &b.session_id))
        });

        Reconstruction {
            sessions,
            ungrouped_events,
        }
    }
}
