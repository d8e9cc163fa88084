//! Change notification stream.
//!
//! The executor publishes every write, create and delete it performs. A
//! polling watcher publishes changes made by anything else, absorbing the
//! paths the executor has just announced so each edit is reported once.
//! Consumers collapse bursts per path with [`Debouncer`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SKIPPED_DIRS: [&str; 3] = [".git", "node_modules", "target"];
const MIN_ABSORB_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Change,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Paths the executor published, kept only as long as a watcher could still
/// need to absorb them.
struct RecentWrites {
    paths: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl RecentWrites {
    fn prune(&mut self) {
        let window = self.window;
        self.paths.retain(|_, at| at.elapsed() <= window);
    }
}

/// Broadcast hub for file changes. Clones share the channel.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<FileChange>,
    recent: Arc<Mutex<RecentWrites>>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: Arc::new(Mutex::new(RecentWrites {
                paths: HashMap::new(),
                window: MIN_ABSORB_WINDOW,
            })),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.tx.subscribe()
    }

    /// Publish a change made by the executor.
    pub fn publish(&self, change: FileChange) {
        {
            let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
            recent.prune();
            recent.paths.insert(change.path.clone(), Instant::now());
        }
        self.send(change);
    }

    fn send(&self, change: FileChange) {
        debug!(path = %change.path.display(), kind = ?change.kind, "file change");
        // No subscribers is fine.
        let _ = self.tx.send(change);
    }

    /// True (once) if the executor published this path within `window`.
    fn absorb(&self, path: &Path, window: Duration) -> bool {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        recent.window = window;
        recent.prune();
        recent.paths.remove(path).is_some()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Polls a directory tree and publishes changes nobody announced.
pub struct ChangeWatcher {
    root: PathBuf,
    notifier: ChangeNotifier,
    interval: Duration,
    snapshot: HashMap<PathBuf, FileStamp>,
}

impl ChangeWatcher {
    /// Takes the initial snapshot immediately; files already present are not
    /// reported.
    pub fn new(root: impl Into<PathBuf>, notifier: ChangeNotifier, interval: Duration) -> Self {
        let root = root.into();
        let snapshot = scan(&root);
        Self {
            root,
            notifier,
            interval,
            snapshot,
        }
    }

    fn absorb_window(&self) -> Duration {
        (self.interval * 2).max(MIN_ABSORB_WINDOW)
    }

    /// Rescan once and publish what changed. Returns the published changes.
    pub fn poll_once(&mut self) -> Vec<FileChange> {
        let current = scan(&self.root);
        let mut changes = Vec::new();

        for (path, stamp) in &current {
            match self.snapshot.get(path) {
                None => changes.push(FileChange::new(path.clone(), ChangeKind::Create)),
                Some(previous) if previous != stamp => {
                    changes.push(FileChange::new(path.clone(), ChangeKind::Change))
                }
                Some(_) => {}
            }
        }
        for path in self.snapshot.keys() {
            if !current.contains_key(path) {
                changes.push(FileChange::new(path.clone(), ChangeKind::Delete));
            }
        }
        self.snapshot = current;

        let window = self.absorb_window();
        changes.retain(|change| !self.notifier.absorb(&change.path, window));
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        for change in &changes {
            self.notifier.send(change.clone());
        }
        changes
    }

    /// Poll forever on the blocking pool.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut watcher = self;
            loop {
                ticker.tick().await;
                watcher = match tokio::task::spawn_blocking(move || {
                    watcher.poll_once();
                    watcher
                })
                .await
                {
                    Ok(watcher) => watcher,
                    Err(e) => {
                        warn!("change watcher stopped: {}", e);
                        return;
                    }
                };
            }
        })
    }
}

fn scan(root: &Path) -> HashMap<PathBuf, FileStamp> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| SKIPPED_DIRS.contains(&name))
                    .unwrap_or(false))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            Some((
                entry.into_path(),
                FileStamp {
                    modified: metadata.modified().ok(),
                    len: metadata.len(),
                },
            ))
        })
        .collect()
}

/// Collapses bursts of events for one path into a single event, emitted once
/// the path has been quiet for the whole window. The latest kind wins.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, change: FileChange, now: Instant) {
        self.pending.insert(change.path, (change.kind, now));
    }

    pub fn drain_ready(&mut self, now: Instant) -> Vec<FileChange> {
        let window = self.window;
        let mut ready: Vec<FileChange> = self
            .pending
            .iter()
            .filter(|(_, (_, last))| now.saturating_duration_since(*last) >= window)
            .map(|(path, (kind, _))| FileChange::new(path.clone(), *kind))
            .collect();
        for change in &ready {
            self.pending.remove(&change.path);
        }
        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Debounce a change stream on a background task.
pub fn debounced(
    mut rx: broadcast::Receiver<FileChange>,
    window: Duration,
) -> mpsc::Receiver<FileChange> {
    let (tx, out) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);
        let tick = (window / 4).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(tick);
        let mut open = true;

        while open || !debouncer.is_empty() {
            tokio::select! {
                received = rx.recv(), if open => match received {
                    Ok(change) => debouncer.push(change, Instant::now()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("debouncer lagged, {} changes dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => open = false,
                },
                _ = ticker.tick() => {
                    for change in debouncer.drain_ready(Instant::now()) {
                        if tx.send(change).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    out
}
