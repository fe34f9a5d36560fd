//! dirsync - continuous mirroring of a hot directory into a backup tree
//!
//! A recursive inotify watcher feeds change events into a durable queue;
//! a pool of workers drains the queue and mirrors each change into the
//! backup directory. The queue survives restarts, so events observed but not
//! yet mirrored are picked up by the next run.

pub mod config;
pub mod error;
pub mod eventlog;
pub mod fslisten;
pub mod logging;
pub mod queue;
pub mod worker;

// Re-exports for convenience
pub use config::{CliOverrides, SyncConfig};
pub use error::{DirsyncError, DirsyncResult};
pub use eventlog::{EventLog, LogFilter, LogRecord, LogSink};
pub use fslisten::{ChangeEvent, ChangeKind, ExcludePatterns, RecursiveWatcher, WatchTable};
pub use queue::{DurableQueue, QueueStore, SnapshotFile, StateLock};
pub use worker::{CancelToken, FailurePolicy, MirrorOptions, PoolOptions, RetryPolicy, WorkerPool};
