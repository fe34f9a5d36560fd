//! Raw inotify record decoding
//!
//! The kernel hands back a packed byte buffer of variable-length records:
//!
//! ```text
//! | wd: i32 | mask: u32 | cookie: u32 | len: u32 | name: [u8; len] (NUL padded) |
//! ```
//!
//! [`decode`] walks such a buffer without any pointer casts and [`classify`]
//! maps a mask onto the four normalized [`ChangeKind`]s.

use std::ffi::OsStr;
use std::fmt;
use std::ops::BitOr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DirsyncError, DirsyncResult};

/// Size of the fixed record header (wd, mask, cookie, len).
pub const HEADER_LEN: usize = std::mem::size_of::<libc::inotify_event>();

/// Longest file name the kernel will report.
pub const NAME_MAX: usize = 255;

/// Normalized classification of a filesystem notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Ignore,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "Create",
            ChangeKind::Modify => "Modify",
            ChangeKind::Delete => "Delete",
            ChangeKind::Ignore => "Ignore",
        }
    }

    /// Create and Modify both mean "something now exists at this path".
    pub fn is_create_like(self) -> bool {
        matches!(self, ChangeKind::Create | ChangeKind::Modify)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized change under the watched root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Absolute path of the changed entry
    #[serde(with = "path_serde")]
    pub path: PathBuf,
    /// What happened to it
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Paths are stored as text when they are valid UTF-8 and as raw bytes
/// otherwise, so any name the kernel reports survives a round trip.
mod path_serde {
    use std::ffi::OsString;
    use std::os::unix::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => serializer.collect_seq(path.as_os_str().as_bytes()),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Stored::deserialize(deserializer)? {
            Stored::Text(text) => PathBuf::from(text),
            Stored::Bytes(bytes) => PathBuf::from(OsString::from_vec(bytes)),
        })
    }
}

/// Bitmask of inotify flags carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u32);

impl EventMask {
    pub const MODIFY: Self = Self(libc::IN_MODIFY);
    pub const ATTRIB: Self = Self(libc::IN_ATTRIB);
    pub const CLOSE_WRITE: Self = Self(libc::IN_CLOSE_WRITE);
    pub const MOVED_FROM: Self = Self(libc::IN_MOVED_FROM);
    pub const MOVED_TO: Self = Self(libc::IN_MOVED_TO);
    pub const CREATE: Self = Self(libc::IN_CREATE);
    pub const DELETE: Self = Self(libc::IN_DELETE);
    pub const DELETE_SELF: Self = Self(libc::IN_DELETE_SELF);
    pub const Q_OVERFLOW: Self = Self(libc::IN_Q_OVERFLOW);
    pub const IGNORED: Self = Self(libc::IN_IGNORED);
    pub const ISDIR: Self = Self(libc::IN_ISDIR);

    /// Flags registered on every watched directory.
    pub const WATCHED: Self = Self(
        libc::IN_CREATE
            | libc::IN_DELETE
            | libc::IN_MODIFY
            | libc::IN_CLOSE_WRITE
            | libc::IN_MOVED_TO
            | libc::IN_MOVED_FROM,
    );

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The subject of the event is a directory.
    pub const fn is_dir(self) -> bool {
        self.contains(Self::ISDIR)
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Opaque watch descriptor returned by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub const fn from_raw(wd: i32) -> Self {
        Self(wd)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

/// Map an event mask to a change kind. First match wins.
pub fn classify(mask: EventMask) -> ChangeKind {
    const PRIORITY: [(EventMask, ChangeKind); 6] = [
        (EventMask::CLOSE_WRITE, ChangeKind::Modify),
        (EventMask::CREATE, ChangeKind::Create),
        (EventMask::MOVED_TO, ChangeKind::Create),
        (EventMask::MODIFY, ChangeKind::Create),
        (EventMask::DELETE, ChangeKind::Delete),
        (EventMask::MOVED_FROM, ChangeKind::Delete),
    ];

    PRIORITY
        .iter()
        .find(|(flag, _)| mask.contains(*flag))
        .map(|(_, kind)| *kind)
        .unwrap_or(ChangeKind::Ignore)
}

/// One undecoded-name record borrowed from a read buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub handle: WatchHandle,
    pub mask: EventMask,
    pub cookie: u32,
    name: &'a [u8],
}

impl<'a> RawRecord<'a> {
    /// The entry name relative to the watched directory, if any.
    pub fn name(&self) -> Option<&'a OsStr> {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.name.len());
        let trimmed = &self.name[..end];
        (!trimmed.is_empty()).then(|| OsStr::from_bytes(trimmed))
    }

    pub fn kind(&self) -> ChangeKind {
        classify(self.mask)
    }

    /// Absolute path of the subject given the watched directory's path.
    pub fn path_under(&self, base: &Path) -> PathBuf {
        match self.name() {
            Some(name) => base.join(name),
            None => base.to_path_buf(),
        }
    }
}

/// Iterator over the records packed in a read buffer
///
/// Yields at most one error, after which it is exhausted: once a length field
/// is wrong nothing after it can be trusted.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Decode the records contained in `buf`.
pub fn decode(buf: &[u8]) -> Records<'_> {
    Records {
        buf,
        offset: 0,
        failed: false,
    }
}

impl<'a> Records<'a> {
    fn fail(&mut self, reason: String) -> Option<DirsyncResult<RawRecord<'a>>> {
        self.failed = true;
        Some(Err(DirsyncError::Decode {
            offset: self.offset,
            reason,
        }))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = DirsyncResult<RawRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        let rest = &self.buf[self.offset..];
        if rest.len() < HEADER_LEN {
            return self.fail(format!("truncated header: {} bytes", rest.len()));
        }

        let word = |at: usize| [rest[at], rest[at + 1], rest[at + 2], rest[at + 3]];
        let wd = i32::from_ne_bytes(word(0));
        let mask = u32::from_ne_bytes(word(4));
        let cookie = u32::from_ne_bytes(word(8));
        let len = u32::from_ne_bytes(word(12)) as usize;

        let end = match HEADER_LEN.checked_add(len) {
            Some(end) if end <= rest.len() => end,
            _ => {
                return self.fail(format!(
                    "name length {} exceeds remaining {} bytes",
                    len,
                    rest.len() - HEADER_LEN
                ))
            }
        };

        let record = RawRecord {
            handle: WatchHandle(wd),
            mask: EventMask(mask),
            cookie,
            name: &rest[HEADER_LEN..end],
        };
        self.offset += end;
        Some(Ok(record))
    }
}

/// Append one record to `buf` in kernel layout, NUL padding the name to the
/// header alignment the way the kernel does.
pub fn encode_record(buf: &mut Vec<u8>, handle: WatchHandle, mask: EventMask, cookie: u32, name: &[u8]) {
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() + 1).div_ceil(HEADER_LEN) * HEADER_LEN
    };

    buf.extend_from_slice(&handle.0.to_ne_bytes());
    buf.extend_from_slice(&mask.0.to_ne_bytes());
    buf.extend_from_slice(&cookie.to_ne_bytes());
    buf.extend_from_slice(&(padded as u32).to_ne_bytes());
    buf.extend_from_slice(name);
    buf.resize(buf.len() + (padded - name.len()), 0);
}
