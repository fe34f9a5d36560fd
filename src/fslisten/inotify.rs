//! Thin safe wrapper over the inotify syscalls

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use crate::error::{DirsyncError, DirsyncResult};

use super::codec::{EventMask, WatchHandle};

/// Outcome of waiting on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// An open inotify instance. The descriptor is closed on drop.
#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
}

impl Inotify {
    pub fn init() -> DirsyncResult<Self> {
        // SAFETY: inotify_init1 takes no pointers; a non-negative return is a
        // fresh descriptor that we take sole ownership of.
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(DirsyncError::Init(io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by the kernel and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    pub fn add_watch(&self, path: &Path, mask: EventMask) -> DirsyncResult<WatchHandle> {
        let watch_error = |source| DirsyncError::Watch {
            path: path.to_path_buf(),
            source,
        };
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| watch_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        // SAFETY: the descriptor is open for the lifetime of `self` and
        // `c_path` is a valid NUL-terminated string for the duration of the call.
        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask.bits()) };
        if wd < 0 {
            return Err(watch_error(io::Error::last_os_error()));
        }
        Ok(WatchHandle::from_raw(wd))
    }

    pub fn rm_watch(&self, handle: WatchHandle) -> io::Result<()> {
        // SAFETY: plain integer arguments on a descriptor we own.
        let rc = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.as_raw()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait until records are available. `None` waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid pollfd for the duration of the call and
        // we pass a count of exactly one.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        match rc {
            n if n < 0 => Err(io::Error::last_os_error()),
            0 => Ok(Readiness::TimedOut),
            _ => Ok(Readiness::Ready),
        }
    }

    /// Read one batch of records into `buf`, returning the filled length.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a live, writable slice and we pass its exact length.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

/// Errors that mean "try the read again" rather than a broken channel.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
