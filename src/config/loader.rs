//! Configuration loading and layering

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DirsyncError, DirsyncResult};

use super::types::{
    default_workers, CliOverrides, ConfigWarning, FileConfig, SyncConfig, DEFAULT_LOG_FILE,
    DEFAULT_SHUTDOWN_GRACE,
};

pub const ENV_WORKERS: &str = "DIRSYNC_WORKERS";
pub const ENV_SHUTDOWN_GRACE: &str = "DIRSYNC_SHUTDOWN_GRACE_SECS";

/// Parse a config file, collecting unknown keys as warnings.
pub fn load_with_warnings(path: &Path) -> DirsyncResult<(FileConfig, Vec<ConfigWarning>)> {
    let content = fs::read_to_string(path)?;
    parse_with_warnings(&content, path)
}

/// Parse config text. `source` only labels errors and warnings.
pub fn parse_with_warnings(
    content: &str,
    source: &Path,
) -> DirsyncResult<(FileConfig, Vec<ConfigWarning>)> {
    let mut unknown: Vec<String> = Vec::new();
    let deserializer = toml::de::Deserializer::new(content);

    let config: FileConfig = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(path.to_string());
    })
    .map_err(|e| DirsyncError::Config {
        file: source.to_path_buf(),
        message: e.to_string(),
    })?;

    let warnings = unknown
        .into_iter()
        .map(|key| {
            let leaf = key.rsplit('.').next().unwrap_or(key.as_str()).to_string();
            ConfigWarning {
                line: find_line_number(content, &leaf),
                key,
                source: source.to_path_buf(),
            }
        })
        .collect();

    Ok((config, warnings))
}

/// `~/.config/dirsync/config.toml` (or the platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dirsync").join("config.toml"))
}

/// Layer CLI flags over the process environment, the config file and the
/// built-in defaults.
pub fn resolve(cli: CliOverrides) -> DirsyncResult<(SyncConfig, Vec<ConfigWarning>)> {
    resolve_with_env(cli, |key| std::env::var(key).ok())
}

/// [`resolve`] with an explicit environment lookup.
pub fn resolve_with_env<F>(cli: CliOverrides, env: F) -> DirsyncResult<(SyncConfig, Vec<ConfigWarning>)>
where
    F: Fn(&str) -> Option<String>,
{
    let (file, warnings) = match &cli.config_file {
        Some(path) => load_with_warnings(path).map_err(|e| match e {
            DirsyncError::Io(source) => DirsyncError::Config {
                file: path.clone(),
                message: source.to_string(),
            },
            other => other,
        })?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => {
                debug!(path = %path.display(), "using user config");
                load_with_warnings(&path)?
            }
            None => (FileConfig::default(), Vec::new()),
        },
    };

    let workers = cli
        .workers
        .or_else(|| env_number(&env, ENV_WORKERS))
        .or(file.workers)
        .unwrap_or_else(default_workers);
    if workers == 0 {
        return Err(DirsyncError::Validation(
            "workers must be at least 1".to_string(),
        ));
    }

    let shutdown_grace = env_number::<u64, _>(&env, ENV_SHUTDOWN_GRACE)
        .or(file.shutdown_grace_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SHUTDOWN_GRACE);

    let config = SyncConfig {
        hot_dir: required(cli.hot_dir.or(file.hot_dir), "hot directory", "--hotdir", "hot_dir")?,
        backup_dir: required(
            cli.backup_dir.or(file.backup_dir),
            "backup directory",
            "--backup",
            "backup_dir",
        )?,
        state_file: required(
            cli.state_file.or(file.state_file),
            "state file",
            "--state",
            "state_file",
        )?,
        log_file: cli
            .log_file
            .or(file.log_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        workers,
        mirror: file.mirror.resolve(),
        exclude: file.exclude,
        shutdown_grace,
        initial_sync: cli.initial_sync || file.initial_sync.unwrap_or(false),
    };

    Ok((config, warnings))
}

fn required(value: Option<PathBuf>, what: &str, flag: &str, key: &str) -> DirsyncResult<PathBuf> {
    match value {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(DirsyncError::Validation(format!(
            "missing {what}: pass {flag} or set `{key}` in the config file"
        ))),
    }
}

/// Read a numeric environment variable; malformed values are ignored.
fn env_number<T, F>(env: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "ignoring invalid environment value");
            None
        }
    }
}

fn find_line_number(content: &str, needle: &str) -> Option<usize> {
    content
        .lines()
        .position(|line| line.trim_start().starts_with(needle))
        .map(|i| i + 1)
}
