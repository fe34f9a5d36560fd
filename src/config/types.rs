//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::worker::{FailurePolicy, MirrorOptions, RetryPolicy};

pub const DEFAULT_LOG_FILE: &str = "sync_log.json";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub hot_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub workers: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
    pub initial_sync: Option<bool>,
    /// Gitignore-style patterns, relative to the hot directory
    pub exclude: Vec<String>,
    pub mirror: MirrorSection,
}

/// `[mirror]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MirrorSection {
    pub marker_prefix: Option<String>,
    pub staging_suffix: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub on_error: Option<FailurePolicy>,
}

impl MirrorSection {
    pub fn resolve(&self) -> MirrorOptions {
        let defaults = MirrorOptions::default();
        MirrorOptions {
            marker_prefix: self.marker_prefix.clone().unwrap_or(defaults.marker_prefix),
            staging_suffix: self
                .staging_suffix
                .clone()
                .unwrap_or(defaults.staging_suffix),
            retry: RetryPolicy {
                attempts: self.retry_attempts.unwrap_or(defaults.retry.attempts).max(1),
                backoff: self
                    .retry_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            on_error: self.on_error.unwrap_or(defaults.on_error),
        }
    }
}

/// Values given on the command line; `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub hot_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub workers: Option<usize>,
    pub config_file: Option<PathBuf>,
    pub initial_sync: bool,
}

/// Fully resolved settings for one `run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub hot_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub state_file: PathBuf,
    pub log_file: PathBuf,
    pub workers: usize,
    pub mirror: MirrorOptions,
    pub exclude: Vec<String>,
    pub shutdown_grace: Duration,
    pub initial_sync: bool,
}

/// Non-fatal problem found while loading configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub source: PathBuf,
    pub line: Option<usize>,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown config key '{}' in {}", self.key, self.source.display())?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
