//! Recursive, filtered, debounced folder watcher.
//!
//! ```text
//! notify callback --mpsc--> forwarder task --record_change()--> pending map
//!                                                   |              (per folder)
//!                                                   +--> (re)arm debounce timer
//!                                                                  |
//!                                   quiet period elapsed --> flush() --> FileChangeEvent
//! ```
//!
//! Each folder owns its pending map and timer. A flush takes the whole map
//! under the lock before anything is published, so no caller ever sees a
//! half-drained batch.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::filter::{summarize, ChangeType, Classification, PathFilter};
use crate::bus::{EventChannel, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatcherConfig {
    /// Quiet period that closes a batch
    pub debounce: Duration,
    /// Extra ignore patterns on top of the built-in list
    pub ignore_patterns: Vec<String>,
    /// Extension categories named in a summary
    pub summary_categories: usize,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            ignore_patterns: Vec::new(),
            summary_categories: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum FileWatchError {
    #[error("Folder does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Relative to the watched folder, `/`-separated
    pub path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub sensitive: bool,
    pub extension: String,
}

/// One closed debounce window for one folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEvent {
    pub folder_path: String,
    pub files: Vec<FileChange>,
    pub file_count: usize,
    pub timestamp: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutcome {
    /// Canonical folder path
    pub path: PathBuf,
    pub already_watching: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileWatcherStatus {
    pub watching: bool,
    pub folders: Vec<String>,
    pub total_events: usize,
    pub ignore_patterns: Vec<String>,
}

struct PendingFile {
    change: ChangeType,
    class: Classification,
}

struct WatcherEntry {
    _watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
    debounce: Option<JoinHandle<()>>,
    pending: HashMap<String, PendingFile>,
    generation: u64,
}

impl Drop for WatcherEntry {
    fn drop(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
        self.forwarder.abort();
    }
}

struct Inner {
    config: FileWatcherConfig,
    filter: RwLock<PathFilter>,
    changes: EventChannel<FileChangeEvent>,
    folders: Mutex<HashMap<PathBuf, WatcherEntry>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct FileWatcher {
    inner: Arc<Inner>,
}

impl FileWatcher {
    pub fn new(config: FileWatcherConfig) -> Self {
        let filter = PathFilter::new(config.ignore_patterns.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                filter: RwLock::new(filter),
                changes: EventChannel::new("file-change"),
                folders: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Start watching `path` recursively. Must be called inside a Tokio runtime.
    ///
    /// Watching a folder that is already watched succeeds with `already_watching`.
    pub fn watch(&self, path: &Path) -> Result<WatchOutcome, FileWatchError> {
        if !path.exists() {
            return Err(FileWatchError::NotFound(path.to_path_buf()));
        }
        let folder = std::fs::canonicalize(path)
            .map_err(|_| FileWatchError::NotFound(path.to_path_buf()))?;
        if !folder.is_dir() {
            return Err(FileWatchError::NotADirectory(folder));
        }

        if self.inner.folders.lock().contains_key(&folder) {
            return Ok(WatchOutcome {
                path: folder,
                already_watching: true,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|source| FileWatchError::Watch {
            path: folder.clone(),
            source,
        })?;
        watcher
            .watch(&folder, RecursiveMode::Recursive)
            .map_err(|source| FileWatchError::Watch {
                path: folder.clone(),
                source,
            })?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let forwarder = tokio::spawn(forward_notifications(
            Arc::downgrade(&self.inner),
            folder.clone(),
            generation,
            rx,
        ));

        let entry = WatcherEntry {
            _watcher: watcher,
            forwarder,
            debounce: None,
            pending: HashMap::new(),
            generation,
        };

        let mut folders = self.inner.folders.lock();
        if folders.contains_key(&folder) {
            // Lost a race with a concurrent watch of the same folder.
            return Ok(WatchOutcome {
                path: folder,
                already_watching: true,
            });
        }
        folders.insert(folder.clone(), entry);
        drop(folders);

        tracing::info!("[files] watching {}", folder.display());
        Ok(WatchOutcome {
            path: folder,
            already_watching: false,
        })
    }

    /// Stop watching a folder, dropping any pending changes.
    ///
    /// Returns `false` when the folder was not being watched.
    pub fn unwatch(&self, path: &Path) -> bool {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let removed = {
            let mut folders = self.inner.folders.lock();
            folders
                .remove(&canonical)
                .or_else(|| folders.remove(path))
        };
        match removed {
            Some(entry) => {
                tracing::info!(
                    "[files] stopped watching {} ({} pending change(s) dropped)",
                    canonical.display(),
                    entry.pending.len()
                );
                true
            }
            None => false,
        }
    }

    /// Stop watching every folder. Returns how many were watched.
    pub fn unwatch_all(&self) -> usize {
        let entries: Vec<(PathBuf, WatcherEntry)> = self.inner.folders.lock().drain().collect();
        let count = entries.len();
        drop(entries);
        if count > 0 {
            tracing::info!("[files] stopped watching {} folder(s)", count);
        }
        count
    }

    pub fn watched_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = self.inner.folders.lock().keys().cloned().collect();
        folders.sort();
        folders
    }

    pub fn status(&self) -> FileWatcherStatus {
        let folders: Vec<String> = self
            .watched_folders()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        FileWatcherStatus {
            watching: !folders.is_empty(),
            folders,
            total_events: self.inner.changes.len(),
            ignore_patterns: self.ignore_patterns(),
        }
    }

    pub fn change_log(&self) -> Vec<FileChangeEvent> {
        self.inner.changes.log()
    }

    /// Replace the custom ignore patterns. Already-pending changes are kept.
    pub fn set_ignore_patterns(&self, patterns: Vec<String>) {
        let mut filter = self.inner.filter.write();
        filter.set_custom(patterns);
        tracing::info!("[files] custom ignore patterns: {:?}", filter.custom_patterns());
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        self.inner.filter.read().custom_patterns().to_vec()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FileChangeEvent) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(listener)
    }

    /// Feed one raw change for `folder` through the pipeline, as the OS watcher would.
    #[cfg(test)]
    pub(crate) fn record_change(&self, folder: &Path, absolute: &Path, change: ChangeType) {
        let generation = self.inner.folders.lock().get(folder).map(|e| e.generation);
        if let Some(generation) = generation {
            self.inner.record_change(folder, generation, absolute, change);
        }
    }
}

impl Inner {
    fn record_change(
        self: &Arc<Self>,
        folder: &Path,
        generation: u64,
        absolute: &Path,
        change: ChangeType,
    ) {
        let Ok(relative) = absolute.strip_prefix(folder) else {
            return;
        };
        let Some(class) = self.filter.read().classify(relative) else {
            return;
        };
        let key = relative_key(relative);

        let mut folders = self.folders.lock();
        let Some(entry) = folders
            .get_mut(folder)
            .filter(|e| e.generation == generation)
        else {
            return;
        };

        let merged = match entry.pending.remove(&key) {
            Some(previous) => previous.change.merge(change),
            None => Some(change),
        };
        if let Some(change) = merged {
            entry.pending.insert(key, PendingFile { change, class });
        }

        if let Some(timer) = entry.debounce.take() {
            timer.abort();
        }
        entry.debounce = Some(tokio::spawn(debounce_timer(
            Arc::downgrade(self),
            folder.to_path_buf(),
            generation,
            self.config.debounce,
        )));
    }

    /// Drain the folder's pending map into one event. Nothing is emitted for an empty map.
    fn flush(&self, folder: &Path, generation: u64) -> Option<FileChangeEvent> {
        let pending = {
            let mut folders = self.folders.lock();
            let entry = folders
                .get_mut(folder)
                .filter(|e| e.generation == generation)?;
            entry.debounce = None;
            std::mem::take(&mut entry.pending)
        };
        if pending.is_empty() {
            return None;
        }

        let mut files: Vec<FileChange> = pending
            .into_iter()
            .map(|(path, file)| FileChange {
                path,
                change_type: file.change,
                sensitive: file.class.sensitive,
                extension: file.class.extension,
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let summary = summarize(
            files.iter().map(|f| f.extension.as_str()),
            self.config.summary_categories,
        );
        let event = FileChangeEvent {
            folder_path: folder.display().to_string(),
            file_count: files.len(),
            files,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            summary,
        };

        tracing::info!("[files] {}: {}", event.folder_path, event.summary);
        self.changes.publish(event.clone());
        Some(event)
    }
}

async fn forward_notifications(
    inner: Weak<Inner>,
    folder: PathBuf,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
) {
    while let Some(result) = rx.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        match result {
            Ok(event) => {
                for (path, change) in changes_from_event(&event) {
                    inner.record_change(&folder, generation, &path, change);
                }
            }
            Err(e) => tracing::warn!("[files] watch error for {}: {}", folder.display(), e),
        }
    }
    tracing::debug!("[files] notification forwarder for {} exited", folder.display());
}

async fn debounce_timer(inner: Weak<Inner>, folder: PathBuf, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    if let Some(inner) = inner.upgrade() {
        inner.flush(&folder, generation);
    }
}

/// Map a raw notification to per-path change types. Metadata-only and access
/// events are dropped.
fn changes_from_event(event: &Event) -> Vec<(PathBuf, ChangeType)> {
    let change = match event.kind {
        EventKind::Create(_) => ChangeType::Created,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeType::Renamed,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeType::Modified,
        EventKind::Remove(_) => ChangeType::Deleted,
        _ => return Vec::new(),
    };
    event.paths.iter().map(|p| (p.clone(), change)).collect()
}

fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    fn watcher() -> FileWatcher {
        FileWatcher::new(FileWatcherConfig::default())
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn notification_kinds_map_to_change_types() {
        let cases = [
            (EventKind::Create(CreateKind::File), Some(ChangeType::Created)),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                Some(ChangeType::Modified),
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                Some(ChangeType::Renamed),
            ),
            (EventKind::Remove(RemoveKind::File), Some(ChangeType::Deleted)),
            (
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                None,
            ),
            (EventKind::Access(notify::event::AccessKind::Any), None),
        ];
        for (kind, expected) in cases {
            let label = format!("{:?}", kind);
            let changes = changes_from_event(&event(kind, "/w/a.rs"));
            assert_eq!(changes.first().map(|(_, c)| *c), expected, "{}", label);
        }
    }

    #[test]
    fn relative_keys_use_forward_slashes() {
        assert_eq!(relative_key(Path::new("src/deep/a.rs")), "src/deep/a.rs");
    }

    #[tokio::test]
    async fn watch_validates_target() {
        let temp = TempDir::new().unwrap();
        let w = watcher();

        assert!(matches!(
            w.watch(&temp.path().join("missing")),
            Err(FileWatchError::NotFound(_))
        ));

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(w.watch(&file), Err(FileWatchError::NotADirectory(_))));
        assert!(w.watched_folders().is_empty());
    }

    #[tokio::test]
    async fn double_watch_reports_already_watching() {
        let temp = TempDir::new().unwrap();
        let w = watcher();

        let first = w.watch(temp.path()).unwrap();
        assert!(!first.already_watching);
        let second = w.watch(temp.path()).unwrap();
        assert!(second.already_watching);
        assert_eq!(first.path, second.path);
        assert_eq!(w.watched_folders().len(), 1);

        assert!(w.unwatch(temp.path()));
        assert!(!w.unwatch(temp.path()));
        assert!(!w.status().watching);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_event() {
        let temp = TempDir::new().unwrap();
        let w = watcher();
        let folder = w.watch(temp.path()).unwrap().path;
        let file = folder.join("src").join("main.rs");

        for _ in 0..5 {
            w.record_change(&folder, &file, ChangeType::Modified);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        // 500ms after the last save: still inside the quiet period.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(w.change_log().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let log = w.change_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].file_count, 1);
        assert_eq!(log[0].files[0].path, "src/main.rs");
        assert_eq!(log[0].files[0].change_type, ChangeType::Modified);
        assert_eq!(log[0].summary, "1 file changed (1 .rs)");
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_changes_emit_separate_events() {
        let temp = TempDir::new().unwrap();
        let w = watcher();
        let folder = w.watch(temp.path()).unwrap().path;

        w.record_change(&folder, &folder.join("a.rs"), ChangeType::Modified);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        w.record_change(&folder, &folder.join("b.md"), ChangeType::Modified);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let log = w.change_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].files[0].path, "a.rs");
        assert_eq!(log[1].files[0].path, "b.md");
    }

    #[tokio::test(start_paused = true)]
    async fn created_is_not_downgraded_and_noise_is_filtered() {
        let temp = TempDir::new().unwrap();
        let w = watcher();
        let folder = w.watch(temp.path()).unwrap().path;

        w.record_change(&folder, &folder.join("new.ts"), ChangeType::Created);
        w.record_change(&folder, &folder.join("new.ts"), ChangeType::Modified);
        w.record_change(&folder, &folder.join("node_modules/x/index.js"), ChangeType::Modified);
        w.record_change(&folder, &folder.join("logo.png"), ChangeType::Created);
        w.record_change(&folder, &folder.join(".env"), ChangeType::Modified);
        w.record_change(&folder, &folder.join("tmp.rs"), ChangeType::Created);
        w.record_change(&folder, &folder.join("tmp.rs"), ChangeType::Deleted);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let log = w.change_log();
        assert_eq!(log.len(), 1);
        let files = &log[0].files;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, ".env");
        assert!(files[0].sensitive);
        assert_eq!(files[1].path, "new.ts");
        assert_eq!(files[1].change_type, ChangeType::Created);
        assert!(!files[1].sensitive);
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_patterns_apply_to_later_changes() {
        let temp = TempDir::new().unwrap();
        let w = watcher();
        let folder = w.watch(temp.path()).unwrap().path;

        w.record_change(&folder, &folder.join("fixtures/a.json"), ChangeType::Modified);
        w.set_ignore_patterns(vec!["fixtures".to_string()]);
        w.record_change(&folder, &folder.join("fixtures/b.json"), ChangeType::Modified);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let log = w.change_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].files.len(), 1);
        assert_eq!(log[0].files[0].path, "fixtures/a.json");
        assert_eq!(w.status().ignore_patterns, vec!["fixtures".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_cancels_pending_batch() {
        let temp = TempDir::new().unwrap();
        let w = watcher();
        let folder = w.watch(temp.path()).unwrap().path;

        w.record_change(&folder, &folder.join("a.rs"), ChangeType::Modified);
        assert!(w.unwatch(&folder));
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert!(w.change_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn folders_debounce_independently() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        let w = watcher();
        let a = w.watch(one.path()).unwrap().path;
        let b = w.watch(two.path()).unwrap().path;

        w.record_change(&a, &a.join("x.rs"), ChangeType::Modified);
        tokio::time::sleep(Duration::from_millis(600)).await;
        // Activity in b must not hold back a's batch.
        w.record_change(&b, &b.join("y.rs"), ChangeType::Modified);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let log = w.change_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].folder_path, a.display().to_string());

        assert_eq!(w.unwatch_all(), 2);
        assert!(w.watched_folders().is_empty());
    }

    #[tokio::test]
    async fn real_filesystem_changes_are_reported() {
        let temp = TempDir::new().unwrap();
        let w = FileWatcher::new(FileWatcherConfig {
            debounce: Duration::from_millis(200),
            ..FileWatcherConfig::default()
        });
        std::fs::create_dir(temp.path().join("src")).unwrap();
        let folder = w.watch(temp.path()).unwrap().path;

        std::fs::write(folder.join("src").join("lib.rs"), "pub fn hi() {}\n").unwrap();
        std::fs::write(folder.join("notes.bin"), [0u8, 1, 2]).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while w.change_log().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let log = w.change_log();
        assert!(!log.is_empty(), "no change event within timeout");
        let paths: Vec<&str> = log[0].files.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"src/lib.rs"));
        assert!(!paths.contains(&"notes.bin"));
        w.unwatch_all();
    }
}
