//! Diff computation against the stored baseline.
//!
//! The strategy, in order:
//!
//! 1. A baseline exists: diff it against the current content (3 lines of
//!    context). Results are cached per path for a short TTL so overlapping
//!    watcher notifications do not recompute the same diff.
//! 2. No baseline and a [`DiffSource`] is configured: ask it for a diff
//!    against HEAD, then against the index, then whether the path is tracked.
//! 3. Otherwise the file is treated as wholly new and a single-hunk
//!    all-additions diff is synthesized.
//!
//! An unchanged file yields [`DiffOutcome::Unchanged`]. Any read or
//! computation failure yields [`DiffOutcome::Failed`], which callers must not
//! confuse with "unchanged".

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use similar::TextDiff;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::snapshot::SnapshotStore;
use crate::vcs::{DiffSource, VcsMode};

/// Lines of context around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// Errors that make a diff unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// The file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The file could not be read.
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Reading or diffing did not finish in time.
    #[error("diff timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The blocking diff task panicked or was cancelled.
    #[error("diff task failed: {0}")]
    Task(String),
}

/// Result of a diff request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Current content equals the reference content.
    Unchanged,
    /// Unified diff text.
    Changed {
        text: String,
        /// True when the diff was synthesized because no baseline existed.
        is_new_file: bool,
    },
    /// No usable diff could be produced.
    Failed(DiffError),
}

impl DiffOutcome {
    /// Returns the diff text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Changed { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedDiff {
    fingerprint: u64,
    text: String,
    at: Instant,
}

/// Produces unified diffs for tracked files.
#[derive(Debug)]
pub struct DiffEngine {
    root: PathBuf,
    snapshots: SnapshotStore,
    cache: Mutex<LruCache<String, CachedDiff>>,
    ttl: Duration,
    timeout: Duration,
    source: Option<Arc<dyn DiffSource>>,
}

impl DiffEngine {
    /// Creates a diff engine reading files under `config.root`.
    #[must_use]
    pub fn new(config: &EngineConfig, snapshots: SnapshotStore) -> Self {
        let capacity = NonZeroUsize::new(config.diff_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: config.root.clone(),
            snapshots,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: config.diff_cache_ttl,
            timeout: config.diff_timeout,
            source: None,
        }
    }

    /// Enables the version-control fallback chain.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn DiffSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Reads the current content of `path` (relative to the root).
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::NotFound`] if the file is missing,
    /// [`DiffError::Timeout`] if the read stalls and [`DiffError::Read`] for
    /// any other I/O failure (including non UTF-8 content).
    pub async fn read_current(&self, path: &str) -> Result<String, DiffError> {
        let full = self.root.join(path);
        match tokio::time::timeout(self.timeout, tokio::fs::read_to_string(&full)).await {
            Err(_) => Err(DiffError::Timeout(self.timeout)),
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DiffError::NotFound(path.to_string()))
            }
            Ok(Err(e)) => Err(DiffError::Read {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Reads `path` from disk and diffs it against its baseline.
    pub async fn diff(&self, path: &str) -> DiffOutcome {
        match self.read_current(path).await {
            Ok(current) => self.diff_content(path, &current).await,
            Err(e) => DiffOutcome::Failed(e),
        }
    }

    /// Diffs already-read `current` content against the baseline of `path`.
    pub async fn diff_content(&self, path: &str, current: &str) -> DiffOutcome {
        match self.snapshots.get_baseline(path).await {
            Some(baseline) => self.diff_against_baseline(path, &baseline, current).await,
            None => self.diff_without_baseline(path, current).await,
        }
    }

    async fn diff_against_baseline(&self, path: &str, baseline: &str, current: &str) -> DiffOutcome {
        if baseline == current {
            return DiffOutcome::Unchanged;
        }

        let fingerprint = fingerprint(baseline, current);
        if let Some(text) = self.cached(path, fingerprint).await {
            trace!(path, "Diff served from cache");
            return DiffOutcome::Changed {
                text,
                is_new_file: false,
            };
        }

        let old = baseline.to_string();
        let new = current.to_string();
        let label = path.to_string();
        let task = tokio::task::spawn_blocking(move || unified_diff(&label, &old, &new));

        let text = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return DiffOutcome::Failed(DiffError::Timeout(self.timeout)),
            Ok(Err(e)) => return DiffOutcome::Failed(DiffError::Task(e.to_string())),
            Ok(Ok(text)) => text,
        };

        if !text.contains("\n@@") && !text.starts_with("@@") {
            return DiffOutcome::Unchanged;
        }

        self.cache.lock().await.put(
            path.to_string(),
            CachedDiff {
                fingerprint,
                text: text.clone(),
                at: Instant::now(),
            },
        );

        DiffOutcome::Changed {
            text,
            is_new_file: false,
        }
    }

    async fn diff_without_baseline(&self, path: &str, current: &str) -> DiffOutcome {
        if let Some(source) = &self.source {
            if let Some(outcome) = self.try_source(source.as_ref(), path).await {
                return outcome;
            }
        }

        match synthesize_new_file_diff(path, current) {
            Some(text) => DiffOutcome::Changed {
                text,
                is_new_file: true,
            },
            None => DiffOutcome::Unchanged,
        }
    }

    /// Walks the fallback chain. `None` means "fall through to synthesis".
    async fn try_source(&self, source: &dyn DiffSource, path: &str) -> Option<DiffOutcome> {
        for mode in VcsMode::CHAIN {
            let answer = tokio::time::timeout(self.timeout, source.vcs_diff(path, mode)).await;
            match answer {
                Ok(Ok(text)) if text.trim().is_empty() => continue,
                Ok(Ok(text)) => {
                    if mode == VcsMode::IsTracked {
                        debug!(path, "Tracked and clean against version control");
                        return Some(DiffOutcome::Unchanged);
                    }
                    debug!(path, %mode, "Using version control diff");
                    return Some(DiffOutcome::Changed {
                        text,
                        is_new_file: false,
                    });
                }
                Ok(Err(e)) => {
                    warn!(path, %mode, error = %e, "Version control diff failed");
                }
                Err(_) => {
                    warn!(path, %mode, timeout_ms = self.timeout.as_millis(), "Version control diff timed out");
                }
            }
        }
        None
    }

    async fn cached(&self, path: &str, fingerprint: u64) -> Option<String> {
        let mut cache = self.cache.lock().await;
        let expired = cache.peek(path)?.at.elapsed() > self.ttl;
        if expired {
            cache.pop(path);
            return None;
        }
        cache
            .get(path)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| entry.text.clone())
    }

    /// Drops the cached diff for `path`.
    pub async fn invalidate(&self, path: &str) {
        self.cache.lock().await.pop(path);
    }

    /// Drops every cached diff.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Number of cached diffs, including expired ones not yet evicted.
    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

fn fingerprint(baseline: &str, current: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    baseline.hash(&mut hasher);
    current.hash(&mut hasher);
    hasher.finish()
}

/// Unified diff between two contents with [`CONTEXT_LINES`] of context.
#[must_use]
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Synthesizes an all-additions diff for a file with no prior state.
///
/// Returns `None` for empty content.
///
/// ```
/// use deltascope_engine::diff::synthesize_new_file_diff;
///
/// let diff = synthesize_new_file_diff("a.py", "x = 1\ny = 2\n").unwrap();
/// assert_eq!(diff, "--- /dev/null\n+++ b/a.py\n@@ -0,0 +1,2 @@\n+x = 1\n+y = 2\n");
/// ```
#[must_use]
pub fn synthesize_new_file_diff(path: &str, content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let mut out = format!("--- /dev/null\n+++ b/{path}\n@@ -0,0 +1,{} @@\n", lines.len());
    for line in lines {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    Some(out)
}
