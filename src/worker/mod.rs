//! Workers that apply queued change events to the backup tree

pub mod affinity;
pub mod handler;
pub mod mirror;
pub mod pool;

pub use affinity::{PathGuard, PathLocks};
pub use handler::{
    marker_target, EventHandler, FailurePolicy, MirrorOptions, Outcome, RetryPolicy, WorkerContext,
    DEFAULT_MARKER_PREFIX, DEFAULT_STAGING_SUFFIX,
};
pub use mirror::{mirror_entry, mirror_file, remove_entry, staged_path, MirrorReport};
pub use pool::{CancelToken, PoolOptions, WorkerPool};
