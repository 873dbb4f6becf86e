//! Scan session state
//!
//! One `ScanSession` record holds everything the dashboard renders for a run.
//! It is only advanced one whole chunk at a time, so an observer never sees
//! the log of chunk N+1 next to the metrics of chunk N.

use crate::metrics::MetricSnapshot;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tokio::sync::{broadcast, RwLock};

pub const READY_LABEL: &str = "Ready...";
pub const STARTING_LABEL: &str = "Starting scan...";
pub const FINISHED_LABEL: &str = "Scan finished.";
pub const CANCELLED_LABEL: &str = "Scan cancelled.";

const TASK_LABEL_CHARS: usize = 40;
const ELLIPSIS: &str = "...";

static EXECUTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Executing: (.*)").expect("executing marker regex is valid"));
static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[ERROR\]([^\n]*)").expect("error marker regex is valid"));
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ansi regex is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Complete,
}

/// What applying a chunk changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkEffect {
    pub delta: MetricSnapshot,
    pub task: Option<String>,
    /// Payload of an in-band `[ERROR]` line, if the chunk carried one.
    pub fault: Option<String>,
}

/// Ordered notifications for live observers of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        started_at: DateTime<Utc>,
    },
    Chunk {
        text: String,
        metrics: MetricSnapshot,
        task: String,
    },
    Finished {
        status: SessionStatus,
        task: String,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSession {
    pub status: SessionStatus,
    pub log: String,
    pub metrics: MetricSnapshot,
    pub task: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Bytes dropped from the head of `log` to honour the size cap.
    pub truncated_bytes: u64,
    #[serde(skip)]
    max_log_bytes: Option<usize>,
}

impl ScanSession {
    pub fn new(max_log_bytes: Option<usize>) -> Self {
        Self {
            status: SessionStatus::Idle,
            log: String::new(),
            metrics: MetricSnapshot::default(),
            task: READY_LABEL.to_string(),
            error: None,
            started_at: None,
            finished_at: None,
            truncated_bytes: 0,
            max_log_bytes: max_log_bytes.filter(|&cap| cap > 0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Wipe all derived state and mark the session running.
    pub fn begin(&mut self) -> SessionEvent {
        *self = Self::new(self.max_log_bytes);
        let now = Utc::now();
        self.status = SessionStatus::Running;
        self.task = STARTING_LABEL.to_string();
        self.started_at = Some(now);
        SessionEvent::Started { started_at: now }
    }

    /// Apply one decoded chunk: log, task label, then metric deltas.
    pub fn apply_chunk(&mut self, text: &str) -> ChunkEffect {
        let at_line_start = self.log.is_empty() || self.log.ends_with('\n');
        self.append_log(text);

        let task = task_label(text);
        if let Some(label) = &task {
            self.task = label.clone();
        }

        let delta = MetricSnapshot::from_chunk(text);
        self.metrics += delta;

        ChunkEffect {
            delta,
            task,
            fault: error_marker(text, at_line_start),
        }
    }

    /// Append a `[!] ERROR:` line for a failure that produced no in-band text.
    pub fn append_diagnostic(&mut self, message: &str) -> String {
        let line = format!("\n[!] ERROR: {}\n", message);
        self.append_log(&line);
        line
    }

    /// Terminal transition. Later calls are ignored.
    pub fn finish(&mut self, task: &str, error: Option<String>) -> Option<SessionEvent> {
        if self.status == SessionStatus::Complete {
            return None;
        }
        self.status = SessionStatus::Complete;
        self.task = task.to_string();
        self.error = error;
        self.finished_at = Some(Utc::now());
        Some(self.finished_event())
    }

    pub fn chunk_event(&self, text: String) -> SessionEvent {
        SessionEvent::Chunk {
            text,
            metrics: self.metrics,
            task: self.task.clone(),
        }
    }

    pub fn finished_event(&self) -> SessionEvent {
        SessionEvent::Finished {
            status: self.status,
            task: self.task.clone(),
            error: self.error.clone(),
        }
    }

    fn append_log(&mut self, text: &str) {
        self.log.push_str(text);
        let Some(cap) = self.max_log_bytes else {
            return;
        };
        if self.log.len() <= cap {
            return;
        }
        let mut cut = self.log.len() - cap;
        while !self.log.is_char_boundary(cut) {
            cut += 1;
        }
        self.log.drain(..cut);
        self.truncated_bytes += cut as u64;
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Shared, lock-guarded session plus its ordered event feed.
///
/// Events are published while the write lock is held, so a subscriber that
/// snapshots under the read lock sees every later event exactly once.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<RwLock<ScanSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(max_log_bytes: Option<usize>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(ScanSession::new(max_log_bytes))),
            events,
        }
    }

    pub async fn snapshot(&self) -> ScanSession {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn log(&self) -> String {
        self.state.read().await.log.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current state together with a receiver for everything after it.
    pub async fn subscribe_with_snapshot(&self) -> (ScanSession, broadcast::Receiver<SessionEvent>) {
        let guard = self.state.read().await;
        (guard.clone(), self.events.subscribe())
    }

    /// Mutate the session and publish the events the mutation produced.
    pub async fn update<R>(&self, f: impl FnOnce(&mut ScanSession) -> (R, Vec<SessionEvent>)) -> R {
        let mut guard = self.state.write().await;
        let (result, events) = f(&mut guard);
        for event in events {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        result
    }
}

/// Label for the last `Executing: ` marker in the chunk, if any.
pub fn task_label(chunk: &str) -> Option<String> {
    let captured = EXECUTING.captures_iter(chunk).last()?.get(1)?.as_str();
    let cleaned = ANSI_ESCAPE.replace_all(captured, "");
    let mut label: String = cleaned
        .chars()
        .filter(|&c| c != '\r')
        .take(TASK_LABEL_CHARS)
        .collect();
    label.push_str(ELLIPSIS);
    Some(label)
}

/// Payload of the first `[ERROR]` line in the chunk.
///
/// A match at offset 0 only counts when the chunk itself starts a new line.
pub fn error_marker(chunk: &str, at_line_start: bool) -> Option<String> {
    ERROR_LINE
        .captures_iter(chunk)
        .find(|caps| at_line_start || caps.get(0).is_some_and(|m| m.start() > 0))
        .map(|caps| {
            let payload = caps.get(1).map_or("", |m| m.as_str()).trim();
            if payload.is_empty() {
                "[ERROR]".to_string()
            } else {
                payload.to_string()
            }
        })
}
