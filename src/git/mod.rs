//! Git commit channel.
//!
//! [`GitWatcher`] polls one repository and publishes a [`CommitEvent`] per new
//! commit on the `git-commit` channel. All git access goes through the `git`
//! binary (see [`repo`]).

pub mod repo;
mod watcher;

pub use repo::{CommitInfo, GitError, RepoInfo, TRUNCATION_MARKER};
pub use watcher::{CommitEvent, GitStatus, GitWatcher, GitWatcherConfig};
