//! Per-file baseline and last-known content.
//!
//! The baseline is the content every diff is computed against. It only
//! advances after a change has been reported, so a diff is always the
//! unreported delta. The last-known content is simply the most recent state
//! observed on disk.
//!
//! The store also remembers which paths were created during this session.
//! A path without a baseline that was *not* created this session is a first
//! sighting of a pre-existing file and must not be reported as new.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::trace;

/// Snapshot state of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Path relative to the watched root.
    pub path: String,
    /// Last reported content (or the initial content if nothing was reported).
    pub baseline_content: String,
    /// Most recent content observed.
    pub last_known_content: String,
}

impl FileSnapshot {
    fn new(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            baseline_content: content.to_string(),
            last_known_content: content.to_string(),
        }
    }
}

/// Concurrent map of [`FileSnapshot`]s keyed by relative path.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshots: Arc<RwLock<HashMap<String, FileSnapshot>>>,
    created: Arc<RwLock<HashSet<String>>>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the baseline content for `path`, if any.
    pub async fn get_baseline(&self, path: &str) -> Option<String> {
        self.snapshots
            .read()
            .await
            .get(path)
            .map(|s| s.baseline_content.clone())
    }

    /// Returns the last-known content for `path`, if any.
    pub async fn get_last_known(&self, path: &str) -> Option<String> {
        self.snapshots
            .read()
            .await
            .get(path)
            .map(|s| s.last_known_content.clone())
    }

    /// Returns a copy of the full snapshot for `path`.
    pub async fn get(&self, path: &str) -> Option<FileSnapshot> {
        self.snapshots.read().await.get(path).cloned()
    }

    /// Sets the baseline, creating the snapshot if needed.
    pub async fn set_baseline(&self, path: &str, content: &str) {
        let mut guard = self.snapshots.write().await;
        match guard.get_mut(path) {
            Some(snapshot) => snapshot.baseline_content = content.to_string(),
            None => {
                guard.insert(path.to_string(), FileSnapshot::new(path, content));
            }
        }
        trace!(path, "Baseline set");
    }

    /// Sets the last-known content without touching the baseline.
    ///
    /// Returns `false` and does nothing if `path` has no snapshot yet; a
    /// snapshot is only created by a first sighting or a reported change.
    pub async fn set_last_known(&self, path: &str, content: &str) -> bool {
        match self.snapshots.write().await.get_mut(path) {
            Some(snapshot) => {
                snapshot.last_known_content = content.to_string();
                true
            }
            None => false,
        }
    }

    /// Stores `content` as both baseline and last-known if `path` has no
    /// snapshot yet.
    ///
    /// Returns `true` if a snapshot was created. The check and the insert
    /// happen under one write lock.
    pub async fn baseline_if_absent(&self, path: &str, content: &str) -> bool {
        let mut guard = self.snapshots.write().await;
        if guard.contains_key(path) {
            return false;
        }
        guard.insert(path.to_string(), FileSnapshot::new(path, content));
        true
    }

    /// Returns `true` if `path` has a snapshot.
    pub async fn contains(&self, path: &str) -> bool {
        self.snapshots.read().await.contains_key(path)
    }

    /// Removes all state for `path`. Returns `true` if a snapshot existed.
    pub async fn forget(&self, path: &str) -> bool {
        self.created.write().await.remove(path);
        self.snapshots.write().await.remove(path).is_some()
    }

    /// Records that `path` was created during this session.
    pub async fn mark_created(&self, path: &str) {
        self.created.write().await.insert(path.to_string());
    }

    /// Clears the created-this-session flag for `path`.
    pub async fn clear_created(&self, path: &str) {
        self.created.write().await.remove(path);
    }

    /// Returns `true` if `path` was created during this session.
    pub async fn was_created(&self, path: &str) -> bool {
        self.created.read().await.contains(path)
    }

    /// Returns all tracked paths.
    pub async fn paths(&self) -> Vec<String> {
        self.snapshots.read().await.keys().cloned().collect()
    }

    /// Returns the number of tracked files.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Returns `true` if no files are tracked.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}
