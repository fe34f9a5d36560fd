//! Startup checks run before any watch is established

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DirsyncError, DirsyncResult};

use super::types::SyncConfig;

impl SyncConfig {
    /// Check the directories, create the backup root if needed, and return
    /// a copy with every path made absolute.
    ///
    /// The backup tree, state file and event log must all live outside the
    /// hot tree, otherwise writing them would feed the watcher its own output.
    pub fn prepare(&self) -> DirsyncResult<SyncConfig> {
        let hot_dir = match fs::canonicalize(&self.hot_dir) {
            Ok(path) if path.is_dir() => path,
            Ok(_) => {
                return Err(invalid(format!(
                    "hot directory {} is not a directory",
                    self.hot_dir.display()
                )))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(invalid(format!(
                    "hot directory {} does not exist",
                    self.hot_dir.display()
                )))
            }
            Err(err) => return Err(err.into()),
        };

        let backup_dir = ensure_backup_dir(&self.backup_dir)?;
        if backup_dir.starts_with(&hot_dir) {
            return Err(invalid(format!(
                "backup directory {} is inside the hot directory {}",
                backup_dir.display(),
                hot_dir.display()
            )));
        }
        if hot_dir.starts_with(&backup_dir) {
            return Err(invalid(format!(
                "hot directory {} is inside the backup directory {}",
                hot_dir.display(),
                backup_dir.display()
            )));
        }

        let state_file = absolute_file(&self.state_file, "state file")?;
        let log_file = absolute_file(&self.log_file, "log file")?;
        for (what, path) in [("state file", &state_file), ("log file", &log_file)] {
            if path.starts_with(&hot_dir) {
                return Err(invalid(format!(
                    "{what} {} is inside the hot directory {}",
                    path.display(),
                    hot_dir.display()
                )));
            }
        }

        Ok(SyncConfig {
            hot_dir,
            backup_dir,
            state_file,
            log_file,
            ..self.clone()
        })
    }
}

fn ensure_backup_dir(path: &Path) -> DirsyncResult<PathBuf> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(invalid(format!(
                "backup path {} exists and is not a directory",
                path.display()
            )))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let parent = parent_or_cwd(path);
            if !parent.is_dir() {
                return Err(invalid(format!(
                    "cannot create backup directory {}: parent {} does not exist",
                    path.display(),
                    parent.display()
                )));
            }
            fs::create_dir(path)?;
            info!(path = %path.display(), "created backup directory");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(fs::canonicalize(path)?)
}

/// Absolute form of a file that may not exist yet; its directory must.
fn absolute_file(path: &Path, what: &str) -> DirsyncResult<PathBuf> {
    let parent = parent_or_cwd(path);
    let Some(name) = path.file_name() else {
        return Err(invalid(format!("{what} {} is not a file path", path.display())));
    };
    match fs::canonicalize(parent) {
        Ok(dir) if dir.is_dir() => Ok(dir.join(name)),
        _ => Err(invalid(format!(
            "directory for {what} {} does not exist",
            path.display()
        ))),
    }
}

fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn invalid(message: String) -> DirsyncError {
    DirsyncError::Validation(message)
}
