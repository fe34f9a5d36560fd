//! Per-event policy: mirror a change, or honour a deletion marker

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{DirsyncError, DirsyncResult};
use crate::eventlog::LogSink;
use crate::fslisten::{ChangeEvent, ChangeKind};

use super::affinity::PathLocks;
use super::mirror::{mirror_entry, remove_entry, staged_path, MirrorReport};

pub const DEFAULT_MARKER_PREFIX: &str = "delete_";
pub const DEFAULT_STAGING_SUFFIX: &str = ".bak";

/// What a worker does after an event fails for good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and take the next event.
    #[default]
    Continue,
    /// Stop the whole pool.
    Shutdown,
}

/// Linear backoff for transient I/O failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(&self, mut op: impl FnMut() -> DirsyncResult<T>) -> DirsyncResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    debug!(attempt, error = %err, "transient failure, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Base-name prefix that turns a change into a delete request
    pub marker_prefix: String,
    /// Appended to every mirrored file name
    pub staging_suffix: String,
    pub retry: RetryPolicy,
    pub on_error: FailurePolicy,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            staging_suffix: DEFAULT_STAGING_SUFFIX.to_string(),
            retry: RetryPolicy::default(),
            on_error: FailurePolicy::default(),
        }
    }
}

/// Identity and roots of one worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: usize,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The kind needs no worker action.
    Ignored,
    Mirrored {
        destination: PathBuf,
        report: MirrorReport,
    },
    Deleted {
        target: PathBuf,
        source_removed: bool,
        destination_removed: bool,
    },
    /// The source disappeared before it could be copied.
    SourceVanished,
}

pub struct EventHandler {
    ctx: WorkerContext,
    options: Arc<MirrorOptions>,
    sink: Arc<dyn LogSink>,
    locks: Arc<PathLocks>,
}

impl EventHandler {
    pub fn new(
        ctx: WorkerContext,
        options: Arc<MirrorOptions>,
        sink: Arc<dyn LogSink>,
        locks: Arc<PathLocks>,
    ) -> Self {
        Self {
            ctx,
            options,
            sink,
            locks,
        }
    }

    pub fn id(&self) -> usize {
        self.ctx.id
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Apply one event. Errors are the caller's to record.
    pub fn handle(&self, event: &ChangeEvent) -> DirsyncResult<Outcome> {
        match event.kind {
            ChangeKind::Modify => self.handle_modify(event),
            ChangeKind::Create | ChangeKind::Delete | ChangeKind::Ignore => Ok(Outcome::Ignored),
        }
    }

    /// Record a failed event in the event log.
    pub fn record_failure(&self, event: &ChangeEvent, err: &DirsyncError) {
        self.sink.record(self.ctx.id, event, &format!("Failed: {err}"));
    }

    fn handle_modify(&self, event: &ChangeEvent) -> DirsyncResult<Outcome> {
        let relative = event
            .path
            .strip_prefix(&self.ctx.source_root)
            .map_err(|_| DirsyncError::StripPrefix {
                path: event.path.clone(),
                root: self.ctx.source_root.clone(),
            })?;
        let destination = self.ctx.destination_root.join(relative);

        // The root itself is never a marker, whatever the backup is called.
        if relative.file_name().is_none() {
            return self.mirror(event, destination);
        }

        match marker_target(&destination, &self.options.marker_prefix) {
            Some(target) => Ok(self.delete_marked(event, target)),
            None => self.mirror(event, destination),
        }
    }

    fn mirror(&self, event: &ChangeEvent, destination: PathBuf) -> DirsyncResult<Outcome> {
        let _guard = self.locks.lock(&destination);
        let suffix = &self.options.staging_suffix;

        let report = match self
            .options
            .retry
            .run(|| mirror_entry(&event.path, &destination, suffix))
        {
            Ok(report) => report,
            Err(err) if err.is_not_found() && fs::symlink_metadata(&event.path).is_err() => {
                debug!(worker = self.ctx.id, path = %event.path.display(), "source vanished before copy");
                self.sink
                    .record(self.ctx.id, event, "Skipped: source no longer exists");
                return Ok(Outcome::SourceVanished);
            }
            Err(err) => return Err(err),
        };

        let action = if report.directories > 0 {
            format!("Copied directory to {}", destination.display())
        } else {
            let parent = destination.parent().unwrap_or(self.ctx.destination_root.as_path());
            format!("Copied file to {}", parent.display())
        };
        self.sink.record(self.ctx.id, event, &action);

        Ok(Outcome::Mirrored {
            destination,
            report,
        })
    }

    /// Remove the marker entry from the source and its target from the
    /// destination. Each side is attempted and logged on its own.
    fn delete_marked(&self, event: &ChangeEvent, target: PathBuf) -> Outcome {
        let _guard = self.locks.lock(&target);
        let target = self.resolve_target(&event.path, target);

        let source_present = fs::symlink_metadata(&event.path).is_ok();
        let source_removed = match remove_entry(&event.path) {
            Ok(()) => {
                let action = if source_present {
                    "Deleted from source"
                } else {
                    "Source already absent"
                };
                self.sink.record(
                    self.ctx.id,
                    &ChangeEvent::new(&event.path, ChangeKind::Delete),
                    action,
                );
                true
            }
            Err(err) => {
                warn!(worker = self.ctx.id, path = %event.path.display(), error = %err, "failed to delete marker from source");
                self.sink.record(
                    self.ctx.id,
                    event,
                    &format!("Failed to delete from source: {err}"),
                );
                false
            }
        };

        let destination_removed = match remove_entry(&target) {
            Ok(()) => {
                self.sink.record(
                    self.ctx.id,
                    &ChangeEvent::new(&target, ChangeKind::Delete),
                    "Deleted from destination",
                );
                true
            }
            Err(err) => {
                warn!(worker = self.ctx.id, path = %target.display(), error = %err, "failed to delete from destination");
                self.sink.record(
                    self.ctx.id,
                    event,
                    &format!("Failed to delete from destination: {err}"),
                );
                false
            }
        };

        Outcome::Deleted {
            target,
            source_removed,
            destination_removed,
        }
    }

    /// Files are mirrored under the staging suffix, directories are not.
    fn resolve_target(&self, marker: &Path, target: PathBuf) -> PathBuf {
        let staged = staged_path(&target, &self.options.staging_suffix);
        match fs::metadata(marker) {
            Ok(metadata) if metadata.is_dir() => target,
            Ok(_) => staged,
            Err(_) if staged.exists() => staged,
            Err(_) => target,
        }
    }
}

/// The real destination named by a marker entry, if `destination` is one.
///
/// A bare marker with nothing after the prefix is not a delete request.
pub fn marker_target(destination: &Path, prefix: &str) -> Option<PathBuf> {
    if prefix.is_empty() {
        return None;
    }
    let name = destination.file_name()?;
    let stripped = name.as_bytes().strip_prefix(prefix.as_bytes())?;
    if stripped.is_empty() {
        return None;
    }
    Some(destination.with_file_name(OsStr::from_bytes(stripped)))
}
