//! Mirrored filesystem mutations
//!
//! Files land in the backup tree under a staging suffix (`a.txt` is stored as
//! `a.txt.bak`). Each file is written to a temp file in the destination
//! directory and renamed over the staged path, so readers of the backup
//! never see a half-written copy.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{DirsyncError, DirsyncResult};

/// What a mirror pass touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub files: usize,
    pub directories: usize,
}

/// `dest` with `suffix` appended to its file name.
pub fn staged_path(dest: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Mirror `src` (file or directory tree) onto `dest`.
///
/// Only a missing `src` is reported as not found. Entries below it that
/// disappear while the tree is walked are skipped.
pub fn mirror_entry(src: &Path, dest: &Path, suffix: &str) -> DirsyncResult<MirrorReport> {
    mirror_entry_with(src, dest, suffix, &mirror_file)
}

fn mirror_entry_with<F>(src: &Path, dest: &Path, suffix: &str, copy: &F) -> DirsyncResult<MirrorReport>
where
    F: Fn(&Path, &Path, &str) -> DirsyncResult<PathBuf>,
{
    let metadata = fs::metadata(src)?;
    let mut report = MirrorReport::default();

    if metadata.is_dir() {
        mirror_dir(src, dest, suffix, copy, &mut report)?;
    } else {
        copy(src, dest, suffix)?;
        report.files += 1;
    }
    Ok(report)
}

fn mirror_dir<F>(src: &Path, dest: &Path, suffix: &str, copy: &F, report: &mut MirrorReport) -> DirsyncResult<()>
where
    F: Fn(&Path, &Path, &str) -> DirsyncResult<PathBuf>,
{
    fs::create_dir_all(dest)?;
    report.directories += 1;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %src_path.display(), "entry vanished during mirror");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let result = if file_type.is_dir() {
            mirror_dir(&src_path, &dest_path, suffix, copy, report)
        } else if src_path.is_file() {
            copy(&src_path, &dest_path, suffix).map(|_| report.files += 1)
        } else {
            debug!(path = %src_path.display(), "skipping entry that is neither file nor directory");
            Ok(())
        };

        match result {
            Err(err) if err.is_not_found() && fs::symlink_metadata(&src_path).is_err() => {
                debug!(path = %src_path.display(), "entry vanished during mirror");
            }
            other => other?,
        }
    }
    Ok(())
}

/// Copy one file to `dest` + `suffix`, returning the staged path.
///
/// Fails with [`DirsyncError::Conflict`] if the destination is a directory.
pub fn mirror_file(src: &Path, dest: &Path, suffix: &str) -> DirsyncResult<PathBuf> {
    if dest.is_dir() {
        return Err(DirsyncError::Conflict {
            path: dest.to_path_buf(),
        });
    }
    let staged = staged_path(dest, suffix);
    if staged.is_dir() {
        return Err(DirsyncError::Conflict { path: staged });
    }

    let parent = match staged.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = File::open(src)?;
    let permissions = reader.metadata()?.permissions();

    let mut tmp = NamedTempFile::new_in(parent)?;
    io::copy(&mut reader, &mut tmp)?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(&staged).map_err(|e| e.error)?;

    Ok(staged)
}

/// Remove a file or directory tree. An already-absent path counts as removed.
pub fn remove_entry(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
