//! Configuration for dirsync
//!
//! Settings are layered, highest priority first:
//! 1. CLI flags
//! 2. Environment variables (`DIRSYNC_*`)
//! 3. Config file (`--config`, else `~/.config/dirsync/config.toml`)
//! 4. Built-in defaults

mod loader;
mod types;
mod validate;

pub use loader::{
    default_config_path, load_with_warnings, parse_with_warnings, resolve, resolve_with_env,
    ENV_SHUTDOWN_GRACE, ENV_WORKERS,
};
pub use types::{
    default_workers, CliOverrides, ConfigWarning, FileConfig, MirrorSection, SyncConfig,
    DEFAULT_LOG_FILE, DEFAULT_SHUTDOWN_GRACE,
};
