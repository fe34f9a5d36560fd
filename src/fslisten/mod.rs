//! Filesystem change listener
//!
//! - `codec`: raw inotify record decoding and classification
//! - `table`: watch handle <-> directory path map
//! - `inotify`: the kernel notification channel
//! - `watcher`: recursive registration and the event source
//! - `exclude`: gitignore-style exclusion patterns

pub mod codec;
pub mod exclude;
pub mod inotify;
pub mod table;
pub mod watcher;

pub use codec::{classify, ChangeEvent, ChangeKind, EventMask, WatchHandle};
pub use exclude::ExcludePatterns;
pub use table::WatchTable;
pub use watcher::{Events, RecursiveWatcher};
