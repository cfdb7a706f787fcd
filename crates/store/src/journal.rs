//! Append-only NDJSON journal for the event log.
//!
//! Appends hand events to a bounded channel; a background task batches them
//! and writes one JSON object per line. A full channel drops the journal
//! write, never the append itself. On startup `replay` rebuilds the log.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use stepline_core::config::StoreConfig;
use stepline_core::{StepError, StepEvent, StepResult};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle used by the event log to queue journal writes (non-blocking).
pub struct JournalWriter {
    sender: mpsc::Sender<StepEvent>,
}

/// Background batch writer task. Completes once every `JournalWriter`
/// handle is dropped and the remaining buffer is flushed.
pub struct JournalTask {
    handle: JoinHandle<()>,
}

impl JournalTask {
    pub async fn finished(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "Journal writer task failed");
        }
    }
}

/// Result of reading a journal back.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    pub events: Vec<StepEvent>,
    pub skipped_lines: usize,
}

impl JournalWriter {
    /// Open (or create) the journal file and spawn the background writer.
    pub async fn start(
        path: impl Into<PathBuf>,
        batch_size: usize,
        flush_interval: Duration,
        capacity: usize,
    ) -> StepResult<(Self, JournalTask)> {
        let path = path.into();
        let (sender, receiver) = mpsc::channel::<StepEvent>(capacity.max(1));

        let writer = BatchWriter::open(path.clone()).await?;
        let handle = tokio::spawn(async move {
            writer.run(receiver, batch_size.max(1), flush_interval).await;
        });

        info!(path = %path.display(), "Event journal initialized");

        Ok((Self { sender }, JournalTask { handle }))
    }

    /// Start a writer from the `[store]` configuration section, if a journal
    /// path is configured.
    pub async fn from_config(config: &StoreConfig) -> StepResult<Option<(Self, JournalTask)>> {
        match &config.journal_path {
            Some(path) => Self::start(
                path,
                config.journal_batch_size,
                Duration::from_millis(config.journal_flush_interval_ms),
                config.journal_channel_capacity,
            )
            .await
            .map(Some),
            None => Ok(None),
        }
    }

    /// Queue an event for the journal (non-blocking).
    pub fn submit(&self, event: &StepEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            metrics::counter!("journal.dropped").increment(1);
            warn!(event_id = event.event_id, "Journal write dropped: {}", e);
        } else {
            metrics::counter!("journal.queued").increment(1);
        }
    }
}

/// Read every event from a journal file. A missing file is an empty journal;
/// unparseable lines are skipped and counted.
pub fn replay(path: &Path) -> StepResult<ReplayOutcome> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No journal to replay");
            return Ok(ReplayOutcome::default());
        }
        Err(e) => return Err(StepError::Journal(format!("{}: {}", path.display(), e))),
    };

    let mut outcome = ReplayOutcome::default();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StepEvent>(&line) {
            Ok(event) => outcome.events.push(event),
            Err(e) => {
                outcome.skipped_lines += 1;
                warn!(line = line_no + 1, error = %e, "Skipping unreadable journal line");
            }
        }
    }

    info!(
        path = %path.display(),
        events = outcome.events.len(),
        skipped = outcome.skipped_lines,
        "Journal replayed"
    );
    Ok(outcome)
}

/// Background writer that batches events and appends them to the file.
struct BatchWriter {
    file: tokio::fs::File,
    path: PathBuf,
}

impl BatchWriter {
    async fn open(path: PathBuf) -> StepResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StepError::Journal(format!("{}: {}", path.display(), e)))?;
        Ok(Self { file, path })
    }

    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<StepEvent>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut buffer: Vec<StepEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => {
                        self.flush(&mut buffer).await;
                        debug!(path = %self.path.display(), "Journal channel closed");
                        return;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&mut self, buffer: &mut Vec<StepEvent>) {
        if buffer.is_empty() {
            return;
        }
        let count = buffer.len();

        let mut payload = String::new();
        for event in buffer.iter() {
            match serde_json::to_string(event) {
                Ok(json) => {
                    payload.push_str(&json);
                    payload.push('\n');
                }
                Err(e) => {
                    error!(event_id = event.event_id, error = %e, "Failed to encode event")
                }
            }
        }
        buffer.clear();

        let written = async {
            self.file.write_all(payload.as_bytes()).await?;
            self.file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                metrics::counter!("journal.flushed").increment(count as u64);
                debug!(count, "Journal batch flushed");
            }
            Err(e) => {
                metrics::counter!("journal.flush_errors").increment(1);
                error!(error = %e, count, path = %self.path.display(), "Failed to flush journal batch");
            }
        }
    }
}
