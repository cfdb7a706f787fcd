//! In-memory event log with time, scenario and session indexes.
//!
//! Writers hold the index lock only for the insert; scans clone `Arc`
//! handles out of the index and release the lock before any aggregation
//! runs, so long reports never stall ingestion.

use crate::journal::JournalWriter;
use crate::log::{EventLog, ScanFilter};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stepline_core::{EventId, NewEvent, StepEvent, StepResult};
use tracing::{debug, info};

type TimeKey = (DateTime<Utc>, EventId);
type TimeIndex = BTreeMap<TimeKey, Arc<StepEvent>>;

#[derive(Default)]
struct LogIndex {
    by_time: TimeIndex,
    by_scenario: HashMap<String, TimeIndex>,
    by_session: HashMap<(String, String), Vec<Arc<StepEvent>>>,
}

impl LogIndex {
    fn insert(&mut self, event: Arc<StepEvent>) {
        let key = (event.occurred_at, event.event_id);
        self.by_time.insert(key, event.clone());
        self.by_scenario
            .entry(event.scenario.clone())
            .or_default()
            .insert(key, event.clone());
        if let Some(session_id) = &event.session_id {
            self.by_session
                .entry((event.scenario.clone(), session_id.clone()))
                .or_default()
                .push(event);
        }
    }
}

/// Thread-safe append-only log backed by ordered in-memory indexes.
pub struct MemoryEventLog {
    next_id: AtomicU64,
    index: RwLock<LogIndex>,
    journal: RwLock<Option<JournalWriter>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            index: RwLock::new(LogIndex::default()),
            journal: RwLock::new(None),
        }
    }

    /// Rebuild a log from previously stored events, keeping their ids.
    /// New appends continue above the highest restored id.
    pub fn from_events(events: impl IntoIterator<Item = StepEvent>) -> Self {
        let mut index = LogIndex::default();
        let mut max_id = 0;
        let mut count = 0usize;
        for event in events {
            max_id = max_id.max(event.event_id);
            index.insert(Arc::new(event));
            count += 1;
        }
        info!(events = count, next_id = max_id + 1, "Event log restored");
        Self {
            next_id: AtomicU64::new(max_id + 1),
            index: RwLock::new(index),
            journal: RwLock::new(None),
        }
    }

    /// Mirror every subsequent append into `writer`.
    pub fn attach_journal(&self, writer: JournalWriter) {
        *self.journal.write() = Some(writer);
    }

    /// Stop journaling and hand back the writer so its task can drain.
    pub fn detach_journal(&self) -> Option<JournalWriter> {
        self.journal.write().take()
    }

    fn range(index: &TimeIndex, filter: &ScanFilter) -> Vec<Arc<StepEvent>> {
        let lower = match filter.from {
            Some(from) => Bound::Included((from, 0)),
            None => Bound::Unbounded,
        };
        let upper = match filter.to {
            Some(to) => Bound::Excluded((to, 0)),
            None => Bound::Unbounded,
        };
        index
            .range((lower, upper))
            .map(|(_, event)| event)
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, event: NewEvent) -> StepResult<EventId> {
        let event_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = Arc::new(StepEvent::from_new(event_id, event));

        self.index.write().insert(stored.clone());

        if let Some(journal) = self.journal.read().as_ref() {
            journal.submit(&stored);
        }

        metrics::counter!("ingest.appended").increment(1);
        debug!(
            event_id,
            scenario = %stored.scenario,
            step = %stored.step,
            user_id = stored.user_id,
            "Event appended"
        );
        Ok(event_id)
    }

    fn scan(&self, filter: &ScanFilter) -> StepResult<Vec<Arc<StepEvent>>> {
        if filter.is_empty_window() {
            return Ok(Vec::new());
        }
        let index = self.index.read();
        let events = match &filter.scenario {
            Some(scenario) => index
                .by_scenario
                .get(scenario)
                .map(|scoped| Self::range(scoped, filter))
                .unwrap_or_default(),
            None => Self::range(&index.by_time, filter),
        };
        Ok(events)
    }

    fn session_events(
        &self,
        scenario: &str,
        session_ids: &[String],
    ) -> StepResult<Vec<Arc<StepEvent>>> {
        let mut events: Vec<Arc<StepEvent>> = {
            let index = self.index.read();
            session_ids
                .iter()
                .filter_map(|id| index.by_session.get(&(scenario.to_string(), id.clone())))
                .flat_map(|group| group.iter().cloned())
                .collect()
        };
        events.sort_by_key(|e| (e.occurred_at, e.event_id));
        events.dedup_by_key(|e| e.event_id);
        Ok(events)
    }

    fn len(&self) -> usize {
        self.index.read().by_time.len()
    }
}
