//! Buffered NDJSON writer backing the event log

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::DirsyncResult;
use crate::fslisten::ChangeEvent;

use super::{LogRecord, LogSink};

/// Records buffered before producers start to wait.
const CHANNEL_CAPACITY: usize = 100;

/// Append-only event log written by a background thread.
///
/// Producers hand records over a bounded channel; `close` drains it and
/// flushes before returning.
#[derive(Debug)]
pub struct EventLog {
    sender: Mutex<Option<SyncSender<LogRecord>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl EventLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: &Path) -> DirsyncResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_writer(file))
    }

    /// Log into an arbitrary writer.
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        let (sender, receiver) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let handle = thread::Builder::new()
            .name("dirsync-eventlog".to_string())
            .spawn(move || write_records(receiver, writer));

        match handle {
            Ok(handle) => Self {
                sender: Mutex::new(Some(sender)),
                writer: Mutex::new(Some(handle)),
            },
            Err(err) => {
                warn!(error = %err, "could not start event log writer, records will be dropped");
                Self {
                    sender: Mutex::new(None),
                    writer: Mutex::new(None),
                }
            }
        }
    }

    pub fn log(&self, record: LogRecord) {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            warn!(path = %record.event_path, action = %record.action, "event log closed, record dropped");
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                if sender.send(record).is_err() {
                    warn!("event log writer stopped, record dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => warn!("event log writer stopped, record dropped"),
        }
    }

    /// Flush everything logged so far and stop the writer. Idempotent.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.writer.lock().take() {
            if handle.join().is_err() {
                warn!("event log writer panicked");
            }
        }
    }
}

impl LogSink for EventLog {
    fn record(&self, worker_id: usize, event: &ChangeEvent, action: &str) {
        self.log(LogRecord::now(worker_id, event, action));
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_records<W: Write>(receiver: Receiver<LogRecord>, writer: W) {
    let mut out = BufWriter::new(writer);

    while let Ok(record) = receiver.recv() {
        write_one(&mut out, &record);
        // Batch whatever queued up behind it before paying for a flush.
        while let Ok(record) = receiver.try_recv() {
            write_one(&mut out, &record);
        }
        if let Err(err) = out.flush() {
            warn!(error = %err, "failed to flush event log");
        }
    }

    if let Err(err) = out.flush() {
        warn!(error = %err, "failed to flush event log");
    }
}

fn write_one<W: Write>(out: &mut W, record: &LogRecord) {
    let result = serde_json::to_writer(&mut *out, record)
        .map_err(std::io::Error::from)
        .and_then(|()| out.write_all(b"\n"));
    if let Err(err) = result {
        warn!(error = %err, path = %record.event_path, "error writing event log record");
    }
}
