//! Event log
//!
//! Records what the workers did, one NDJSON record per line, for later
//! inspection with `dirsync view`. Distinct from the diagnostic `tracing`
//! output: this is the user-facing history of mirrored operations.

pub mod viewer;
mod writer;

pub use viewer::{format_record, load_records, LogFilter};
pub use writer::EventLog;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::fslisten::ChangeEvent;

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub worker_id: usize,
    pub event_type: String,
    pub event_path: String,
    pub action: String,
}

impl LogRecord {
    /// Build a record stamped with the current time.
    pub fn now(worker_id: usize, event: &ChangeEvent, action: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            worker_id,
            event_type: event.kind.to_string(),
            event_path: event.path.display().to_string(),
            action: action.to_string(),
        }
    }
}

/// Receiver of worker activity
///
/// Implementations must not block the caller for long.
pub trait LogSink: Send + Sync {
    fn record(&self, worker_id: usize, event: &ChangeEvent, action: &str);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _worker_id: usize, _event: &ChangeEvent, _action: &str) {}
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: parking_lot::Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, worker_id: usize, event: &ChangeEvent, action: &str) {
        self.records
            .lock()
            .push(LogRecord::now(worker_id, event, action));
    }
}
