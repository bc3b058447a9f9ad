//! Polling commit watcher for a single repository.
//!
//! One watch at a time per [`GitWatcher`]. Each tick compares HEAD against the
//! watermark (the last commit already reported) and emits a [`CommitEvent`]
//! for every commit in between, oldest first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::repo::{self, CommitInfo, GitError, RepoInfo};
use crate::bus::{EventChannel, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitWatcherConfig {
    pub poll_interval: Duration,
    pub max_diff_chars: usize,
    pub recent_commit_limit: usize,
}

impl Default for GitWatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_diff_chars: 5000,
            recent_commit_limit: 10,
        }
    }
}

/// One newly observed commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitEvent {
    pub repo_path: String,
    pub branch: String,
    pub commit: CommitInfo,
    /// Diff against the parent, possibly truncated
    pub diff: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub watching: bool,
    pub repo_path: Option<String>,
    pub branch: Option<String>,
    pub last_commit_hash: Option<String>,
    pub total_commits: usize,
}

struct WatchState {
    repo: RepoInfo,
    last_commit_hash: Option<String>,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchState {
    fn shut_down(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

struct Inner {
    config: GitWatcherConfig,
    commits: EventChannel<CommitEvent>,
    state: Mutex<Option<WatchState>>,
    next_generation: AtomicU64,
    /// Serializes ticks so the watermark is read and advanced by one tick at a time.
    tick: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct GitWatcher {
    inner: Arc<Inner>,
}

impl GitWatcher {
    pub fn new(config: GitWatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                commits: EventChannel::new("git-commit"),
                state: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                tick: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Validate `path` without watching it.
    pub async fn select_repo(&self, path: &Path) -> Result<RepoInfo, GitError> {
        repo::validate(path).await
    }

    /// Watch the repository containing `path`, replacing any previous watch.
    ///
    /// Commits already present are not reported; the current HEAD becomes the watermark.
    pub async fn start_watching(&self, path: &Path) -> Result<RepoInfo, GitError> {
        self.stop_watching();

        let info = repo::validate(path).await?;
        let head = repo::head_hash(&info.root).await?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            generation,
            cancel.clone(),
            self.inner.config.poll_interval,
        ));

        let state = WatchState {
            repo: info.clone(),
            last_commit_hash: head.clone(),
            generation,
            cancel,
            task,
        };
        if let Some(previous) = self.inner.state.lock().replace(state) {
            previous.shut_down();
        }

        tracing::info!(
            "[git] watching {} on {} (HEAD {})",
            info.root.display(),
            info.branch,
            head.as_deref().unwrap_or("<none>")
        );
        Ok(info)
    }

    /// Stop polling. Returns `false` when nothing was being watched.
    ///
    /// The commit log is kept.
    pub fn stop_watching(&self) -> bool {
        let previous = self.inner.state.lock().take();
        match previous {
            Some(state) => {
                tracing::info!("[git] stopped watching {}", state.repo.root.display());
                state.shut_down();
                true
            }
            None => false,
        }
    }

    /// Run one tick immediately. Returns the number of commits emitted.
    pub async fn poll_now(&self) -> Result<usize, GitError> {
        let generation = self
            .inner
            .state
            .lock()
            .as_ref()
            .map(|s| s.generation)
            .ok_or(GitError::NotWatching)?;
        self.inner.poll(generation).await
    }

    pub fn is_watching(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// Last commit already reported.
    pub fn watermark(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .as_ref()
            .and_then(|s| s.last_commit_hash.clone())
    }

    pub fn status(&self) -> GitStatus {
        let total_commits = self.inner.commits.len();
        let state = self.inner.state.lock();
        match state.as_ref() {
            Some(s) => GitStatus {
                watching: true,
                repo_path: Some(s.repo.root.display().to_string()),
                branch: Some(s.repo.branch.clone()),
                last_commit_hash: s.last_commit_hash.clone(),
                total_commits,
            },
            None => GitStatus {
                watching: false,
                repo_path: None,
                branch: None,
                last_commit_hash: None,
                total_commits,
            },
        }
    }

    /// Most recent commits of the watched repository, read from git.
    pub async fn recent_commits(&self, limit: Option<usize>) -> Result<Vec<CommitInfo>, GitError> {
        let root = self.watched_root().ok_or(GitError::NotWatching)?;
        let limit = limit.unwrap_or(self.inner.config.recent_commit_limit);
        repo::recent_commits(&root, limit).await
    }

    pub fn commit_log(&self) -> Vec<CommitEvent> {
        self.inner.commits.log()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CommitEvent) + Send + Sync + 'static,
    {
        self.inner.commits.subscribe(listener)
    }

    fn watched_root(&self) -> Option<PathBuf> {
        self.inner
            .state
            .lock()
            .as_ref()
            .map(|s| s.repo.root.clone())
    }
}

impl Inner {
    /// Repository root and watermark, if `generation` is still the active watch.
    fn snapshot(&self, generation: u64) -> Option<(PathBuf, Option<String>)> {
        self.state
            .lock()
            .as_ref()
            .filter(|s| s.generation == generation)
            .map(|s| (s.repo.root.clone(), s.last_commit_hash.clone()))
    }

    /// Apply `f` to the watch state if `generation` is still active.
    fn update<F: FnOnce(&mut WatchState)>(&self, generation: u64, f: F) -> bool {
        match self.state.lock().as_mut() {
            Some(state) if state.generation == generation => {
                f(state);
                true
            }
            _ => false,
        }
    }

    async fn poll(&self, generation: u64) -> Result<usize, GitError> {
        let _tick = self.tick.lock().await;

        let Some((root, watermark)) = self.snapshot(generation) else {
            return Ok(0);
        };

        let branch = repo::current_branch(&root).await?;
        if !self.update(generation, |s| s.repo.branch = branch.clone()) {
            return Ok(0);
        }

        let Some(head) = repo::head_hash(&root).await? else {
            return Ok(0);
        };
        if watermark.as_deref() == Some(head.as_str()) {
            return Ok(0);
        }

        if let Some(mark) = watermark.as_deref() {
            if !repo::commit_exists(&root, mark).await? {
                // History was rewritten; there is nothing to diff against.
                tracing::warn!(
                    "[git] watermark {} no longer exists in {}, re-anchoring to {}",
                    mark,
                    root.display(),
                    head
                );
                self.update(generation, |s| s.last_commit_hash = Some(head.clone()));
                return Ok(0);
            }
        }

        let hashes = repo::commits_between(&root, watermark.as_deref(), &head).await?;
        let repo_path = root.display().to_string();
        let mut emitted = 0;

        for hash in hashes {
            let commit = repo::commit_info(&root, &hash).await?;
            let diff = repo::commit_diff(&root, &hash, self.config.max_diff_chars).await?;

            // Advance first: a failure later in this batch must not re-emit it.
            if !self.update(generation, |s| s.last_commit_hash = Some(hash.clone())) {
                break;
            }

            let event = CommitEvent {
                repo_path: repo_path.clone(),
                branch: branch.clone(),
                commit,
                diff,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };
            tracing::info!(
                "[git] new commit {} on {}: {}",
                short_hash(&event.commit.hash),
                branch,
                event.commit.message
            );
            self.commits.publish(event);
            emitted += 1;
        }

        // Also covers an empty range, e.g. HEAD reset to an ancestor.
        self.update(generation, |s| s.last_commit_hash = Some(head.clone()));
        Ok(emitted)
    }
}

async fn poll_loop(
    inner: Weak<Inner>,
    generation: u64,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                if let Err(e) = inner.poll(generation).await {
                    tracing::warn!("[git] poll failed, retrying next interval: {}", e);
                }
            }
        }
    }
    tracing::debug!("[git] poll loop {} exited", generation);
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}
