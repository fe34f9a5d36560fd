//! Error types for dirsync
//!
//! Uses `thiserror` for library errors; the binary wraps them in `anyhow`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dirsync operations
pub type DirsyncResult<T> = Result<T, DirsyncError>;

/// Main error type for dirsync operations
#[derive(Error, Debug)]
pub enum DirsyncError {
    /// The kernel notification channel could not be created
    #[error("failed to initialize inotify: {0}")]
    Init(#[source] io::Error),

    /// A directory could not be registered for monitoring
    #[error("failed to add watch for {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading from the notification channel failed
    #[error("error reading inotify events: {0}")]
    Read(#[source] io::Error),

    /// A raw kernel record could not be decoded
    #[error("malformed inotify record at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    /// The mirror target exists with an incompatible type
    #[error("destination {path} is a directory, not a file")]
    Conflict { path: PathBuf },

    /// Queue snapshot could not be read or written
    #[error("queue state {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// Another process holds the state file
    #[error("state file {path} is in use by another dirsync process")]
    StateLocked { path: PathBuf },

    /// An event path is not located under the watched root
    #[error("path '{path}' is not under '{root}'")]
    StripPrefix { path: PathBuf, root: PathBuf },

    /// Invalid configuration
    #[error("invalid configuration in {file}: {message}")]
    Config { file: PathBuf, message: String },

    /// Startup validation failed
    #[error("{0}")]
    Validation(String),

    /// A timestamp argument is not valid RFC 3339
    #[error("invalid timestamp '{value}': expected RFC 3339 (e.g. 2024-05-01T12:00:00Z)")]
    InvalidTimestamp { value: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DirsyncError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DirsyncError::Io(err) | DirsyncError::Read(err) => matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether the error means the source path no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirsyncError::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}
