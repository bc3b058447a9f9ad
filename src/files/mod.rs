//! Filesystem change channel.
//!
//! [`FileWatcher`] watches any number of folders and publishes one
//! [`FileChangeEvent`] per folder per quiet period on the `file-change`
//! channel. What counts as a relevant change is decided by [`filter`].

pub mod filter;
mod watcher;

pub use filter::{ChangeType, PathFilter, DEFAULT_IGNORE};
pub use watcher::{
    FileChange, FileChangeEvent, FileWatchError, FileWatcher, FileWatcherConfig,
    FileWatcherStatus, WatchOutcome,
};
