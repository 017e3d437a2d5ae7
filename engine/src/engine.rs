//! The change engine: one instance per watched root.
//!
//! [`ChangeEngine`] owns every piece of per-root state (snapshots, diff cache,
//! symbol memory, history, debounce timers) and runs the pipeline for each
//! file once its notifications go quiet:
//!
//! ```text
//! FileEvent -> PathFilter -> DebounceScheduler -> read -> SnapshotStore
//!   -> DiffEngine -> DiffParser -> NoiseFilter -> SymbolParser
//!   -> ChangeClassifier -> ChangeConsolidator -> EngineEvent -> baseline
//! ```
//!
//! A pass that produces no event (first sighting, noise, unsupported
//! language, failure) leaves the baseline where it was, so the next edit is
//! diffed against the same reference point.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::classify::{ChangeClassifier, SymbolMemory};
use crate::config::EngineConfig;
use crate::diff::{parse_unified_diff, DiffEngine, DiffError, DiffOutcome};
use crate::error::{EngineError, Result};
use crate::filter::{IgnoreMatcher, PathFilter};
use crate::history::{ChangeConsolidator, ChangeHistory};
use crate::noise::NoiseFilter;
use crate::outline::OutlineParser;
use crate::snapshot::SnapshotStore;
use crate::symbols::{ParseOutcome, SymbolParser, SymbolTable};
use crate::types::{ChangeEvent, EngineEvent, FileEvent, FileEventKind};
use crate::utils::DebounceScheduler;
use crate::vcs::{DiffSource, GitDiffSource};
use crate::watcher::scan_existing_files;

/// Files read in parallel by [`ChangeEngine::initial_scan`].
const SCAN_CONCURRENCY: usize = 64;

/// What one processing pass did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A change event was emitted and the baseline advanced.
    Reported,
    /// The file had never been seen; its content became the baseline.
    FirstSighting,
    /// Content equals the baseline.
    NoChange,
    /// Only whitespace or comments changed.
    Noise,
    /// No symbol could be tied to the change.
    Unattributed,
    /// The symbol parser failed.
    ParseFailed,
    /// The file could not be read or diffed.
    DiffFailed,
}

/// Builder for [`ChangeEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    config: EngineConfig,
    parser: Option<Arc<dyn SymbolParser>>,
    source: Option<Arc<dyn DiffSource>>,
    matcher: Option<Arc<dyn IgnoreMatcher>>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            parser: None,
            source: None,
            matcher: None,
        }
    }

    /// Uses `parser` for symbol ranges instead of [`OutlineParser`].
    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn SymbolParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Uses `source` as the fallback diff provider.
    ///
    /// Without one, `git` is used when `vcs_fallback` is enabled.
    #[must_use]
    pub fn diff_source(mut self, source: Arc<dyn DiffSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replaces the glob ignore list with a custom matcher.
    #[must_use]
    pub fn ignore_matcher(mut self, matcher: Arc<dyn IgnoreMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Builds the engine. Events are published on `events`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Filter`] if an ignore pattern is invalid.
    pub fn build(self, events: mpsc::Sender<EngineEvent>) -> Result<ChangeEngine> {
        let filter = match self.matcher {
            Some(matcher) => PathFilter::new(matcher),
            None => PathFilter::from_patterns(&self.config.ignore_patterns)?,
        };

        let source = self.source.or_else(|| {
            self.config.vcs_fallback.then(|| {
                Arc::new(GitDiffSource::new(self.config.root.clone(), self.config.diff_timeout))
                    as Arc<dyn DiffSource>
            })
        });

        let snapshots = SnapshotStore::new();
        let mut diff = DiffEngine::new(&self.config, snapshots.clone());
        if let Some(source) = source {
            diff = diff.with_source(source);
        }

        let inner = Inner {
            history: RwLock::new(ChangeHistory::new(self.config.history_limit)),
            parser: self.parser.unwrap_or_else(|| Arc::new(OutlineParser)),
            filter,
            snapshots,
            diff,
            classifier: ChangeClassifier::new(),
            consolidator: ChangeConsolidator,
            memory: SymbolMemory::new(),
            debouncer: DebounceScheduler::new(),
            locks: Mutex::new(HashMap::new()),
            events,
            config: self.config,
        };

        info!(
            root = %inner.config.root.display(),
            debounce_ms = inner.config.debounce.as_millis(),
            vcs_fallback = inner.config.vcs_fallback,
            "Change engine created"
        );

        Ok(ChangeEngine {
            inner: Arc::new(inner),
        })
    }
}

#[derive(Debug)]
struct Inner {
    config: EngineConfig,
    filter: PathFilter,
    parser: Arc<dyn SymbolParser>,
    snapshots: SnapshotStore,
    diff: DiffEngine,
    classifier: ChangeClassifier,
    consolidator: ChangeConsolidator,
    memory: SymbolMemory,
    history: RwLock<ChangeHistory>,
    debouncer: DebounceScheduler<String>,
    /// Serialises passes over the same file.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: mpsc::Sender<EngineEvent>,
}

/// Incremental change detector for one watched root.
///
/// Cloning is cheap; clones share all state.
#[derive(Debug, Clone)]
pub struct ChangeEngine {
    inner: Arc<Inner>,
}

impl ChangeEngine {
    /// Builds an engine with the default parser and ignore list.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Filter`] if an ignore pattern is invalid.
    pub fn new(config: EngineConfig, events: mpsc::Sender<EngineEvent>) -> Result<Self> {
        EngineBuilder::new(config).build(events)
    }

    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn filter(&self) -> &PathFilter {
        &self.inner.filter
    }

    #[must_use]
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.inner.snapshots
    }

    /// Handles one watcher notification.
    ///
    /// Adds and changes are debounced; an unlink discards the file's state
    /// immediately.
    pub async fn on_file_event(&self, event: FileEvent) {
        let FileEvent { path, kind } = event;
        if self.inner.filter.is_ignored(&path) {
            trace!(path = %path, "Ignored file event");
            return;
        }

        trace!(path = %path, ?kind, "File event");
        match kind {
            FileEventKind::Add => {
                if !self.inner.snapshots.contains(&path).await {
                    self.inner.snapshots.mark_created(&path).await;
                }
                self.schedule(path).await;
            }
            FileEventKind::Change => self.schedule(path).await,
            FileEventKind::Unlink => {
                self.forget(&path).await;
                self.forget_descendants(&path).await;
            }
        }
    }

    /// Feeds watcher events into the engine until `rx` closes.
    pub async fn run(self, mut rx: mpsc::Receiver<FileEvent>) {
        while let Some(event) = rx.recv().await {
            self.on_file_event(event).await;
        }
        debug!("File event channel closed, engine loop exiting");
    }

    async fn schedule(&self, path: String) {
        let engine = self.clone();
        let key = path.clone();
        let action = async move {
            let outcome = engine.process_file(&path).await;
            trace!(path = %path, ?outcome, "Processing pass finished");
        };

        if let Err(e) = self
            .inner
            .debouncer
            .schedule(key, self.inner.config.debounce, action)
            .await
        {
            warn!(error = %e, "Failed to schedule processing pass");
        }
    }

    /// Runs one processing pass for `path` right away, bypassing the
    /// debounce timer.
    pub async fn process_file(&self, path: &str) -> ProcessOutcome {
        let lock = self.file_lock(path).await;
        let _guard = lock.lock().await;
        let inner = &self.inner;

        let current = match inner.diff.read_current(path).await {
            Ok(content) => content,
            Err(DiffError::NotFound(_)) => {
                debug!(path, "File vanished before processing");
                return ProcessOutcome::DiffFailed;
            }
            Err(e) => {
                warn!(path, error = %e, "Failed to read file");
                return ProcessOutcome::DiffFailed;
            }
        };

        if !inner.snapshots.contains(path).await && !inner.snapshots.was_created(path).await {
            inner.snapshots.baseline_if_absent(path, &current).await;
            debug!(path, "First sighting, baseline recorded");
            return ProcessOutcome::FirstSighting;
        }

        let outcome = inner.diff.diff_content(path, &current).await;
        inner.snapshots.set_last_known(path, &current).await;

        let (raw_diff, is_new_file) = match outcome {
            DiffOutcome::Unchanged => {
                trace!(path, "No change against baseline");
                return ProcessOutcome::NoChange;
            }
            DiffOutcome::Failed(e) => {
                warn!(path, error = %e, "Diff failed, baseline kept");
                return ProcessOutcome::DiffFailed;
            }
            DiffOutcome::Changed { text, is_new_file } => (text, is_new_file),
        };

        let lines = parse_unified_diff(&raw_diff);
        let noise = NoiseFilter::for_path(path);
        if noise.is_noise(lines.added_text(), lines.deleted_text()) {
            debug!(path, "Whitespace or comment only change suppressed");
            return ProcessOutcome::Noise;
        }

        self.remember_baseline_symbols(path).await;

        let parsed = match self.parse(path, &current).await {
            ParseOutcome::Parsed(parsed) => parsed,
            ParseOutcome::Unsupported => {
                debug!(path, "Language not supported, change not attributed");
                return ProcessOutcome::Unattributed;
            }
            ParseOutcome::Failed(message) => {
                warn!(path, error = %message, "Symbol parse failed, baseline kept");
                return ProcessOutcome::ParseFailed;
            }
        };
        let table = SymbolTable::resolve(&parsed, &current);

        let mut changes = inner
            .classifier
            .classify_all(&table, path, &lines, is_new_file, &noise);
        changes.extend(inner.memory.deleted_since(path, &table).await);

        if changes.is_empty() {
            debug!(path, symbols = table.symbols.len(), "No attributable changes");
            return ProcessOutcome::Unattributed;
        }

        let relations = inner.classifier.call_relations(&table, path, &lines);
        let summary = inner.consolidator.consolidate(&changes, &lines);
        let change_count = changes.len();

        let mut event = ChangeEvent::new(path, changes, relations, is_new_file, raw_diff);
        event.summary = summary;

        inner.history.write().await.push(event.clone());
        if inner.events.send(EngineEvent::Change(event)).await.is_err() {
            warn!(path, "Event receiver dropped, change not delivered");
        }

        inner.snapshots.set_baseline(path, &current).await;
        inner.snapshots.clear_created(path).await;
        inner.diff.invalidate(path).await;
        inner.memory.remember(path, &table).await;

        debug!(path, changes = change_count, is_new_file, "Change reported");
        ProcessOutcome::Reported
    }

    /// Records the baseline's symbols the first time a file is processed, so
    /// symbols removed by this edit can be detected.
    async fn remember_baseline_symbols(&self, path: &str) {
        let inner = &self.inner;
        if inner.memory.contains(path).await {
            return;
        }
        let Some(baseline) = inner.snapshots.get_baseline(path).await else {
            return;
        };
        if let ParseOutcome::Parsed(parsed) = self.parse(path, &baseline).await {
            let table = SymbolTable::resolve(&parsed, &baseline);
            inner.memory.remember(path, &table).await;
        }
    }

    /// Runs the symbol parser off the async workers, bounded by the diff
    /// timeout.
    async fn parse(&self, path: &str, content: &str) -> ParseOutcome {
        let parser = Arc::clone(&self.inner.parser);
        let path = path.to_string();
        let content = content.to_string();
        let timeout = self.inner.config.diff_timeout;

        let task = tokio::task::spawn_blocking(move || parser.parse_symbols(&path, &content));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ParseOutcome::Failed(format!("parser task failed: {e}")),
            Err(_) => ParseOutcome::Failed(format!(
                "symbol parse timed out after {}ms",
                timeout.as_millis()
            )),
        }
    }

    async fn forget(&self, path: &str) {
        let inner = &self.inner;
        if let Err(e) = inner.debouncer.cancel(path.to_string()).await {
            warn!(path, error = %e, "Failed to cancel pending pass");
        }

        let lock = self.file_lock(path).await;
        let tracked = {
            let _guard = lock.lock().await;
            let had_snapshot = inner.snapshots.forget(path).await;
            let had_history = inner.history.write().await.forget(path);
            inner.memory.forget(path).await;
            inner.diff.invalidate(path).await;
            had_snapshot || had_history
        };
        inner.locks.lock().await.remove(path);

        if tracked {
            info!(path, "File forgotten");
            let event = EngineEvent::FileForgotten {
                path: path.to_string(),
            };
            if inner.events.send(event).await.is_err() {
                warn!(path, "Event receiver dropped, deletion not delivered");
            }
        }
    }

    /// Forgets every tracked file below `dir`. Some backends only report
    /// the removal of a directory, not of the files inside it.
    async fn forget_descendants(&self, dir: &str) {
        let prefix = format!("{dir}/");
        let nested: Vec<String> = self
            .inner
            .snapshots
            .paths()
            .await
            .into_iter()
            .filter(|p| p.starts_with(&prefix))
            .collect();
        if nested.is_empty() {
            return;
        }

        debug!(dir, files = nested.len(), "Directory removed, forgetting nested files");
        for path in nested {
            self.forget(&path).await;
        }
    }

    async fn file_lock(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        Arc::clone(locks.entry(path.to_string()).or_default())
    }

    /// Baselines every accepted file under the root without emitting events.
    ///
    /// Returns the number of files baselined.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub async fn initial_scan(&self) -> Result<usize> {
        let root = self.inner.config.root.clone();
        let filter = self.inner.filter.clone();
        let files = tokio::task::spawn_blocking(move || scan_existing_files(&root, &filter))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))??;

        let permits = Arc::new(Semaphore::new(SCAN_CONCURRENCY));
        let mut tasks = JoinSet::new();
        for path in files {
            let engine = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                engine.baseline(&path).await.then_some(())
            });
        }

        let mut baselined = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(())) => baselined += 1,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Baseline task failed"),
            }
        }

        info!(files = baselined, "Initial scan complete");
        Ok(baselined)
    }

    async fn baseline(&self, path: &str) -> bool {
        let lock = self.file_lock(path).await;
        let _guard = lock.lock().await;
        match self.inner.diff.read_current(path).await {
            Ok(content) => self.inner.snapshots.baseline_if_absent(path, &content).await,
            Err(e) => {
                debug!(path, error = %e, "Skipping unreadable file");
                false
            }
        }
    }

    /// All retained events for `path`, oldest first.
    pub async fn history(&self, path: &str) -> Vec<ChangeEvent> {
        self.inner.history.read().await.get(path)
    }

    /// Retained events for `path` except the most recent one.
    pub async fn previous_changes(&self, path: &str) -> Vec<ChangeEvent> {
        self.inner.history.read().await.previous(path)
    }

    /// Clears history, symbol memory and the diff cache, and re-baselines
    /// every tracked file to its current content.
    pub async fn reset(&self) {
        let inner = &self.inner;
        inner.history.write().await.clear();
        inner.memory.clear().await;
        inner.diff.clear().await;

        for path in inner.snapshots.paths().await {
            let lock = self.file_lock(&path).await;
            let _guard = lock.lock().await;
            match inner.diff.read_current(&path).await {
                Ok(content) => {
                    inner.snapshots.set_baseline(&path, &content).await;
                    inner.snapshots.clear_created(&path).await;
                }
                Err(e) => {
                    debug!(path = %path, error = %e, "Dropping snapshot on reset");
                    inner.snapshots.forget(&path).await;
                }
            }
        }

        info!("Engine state reset");
    }
}
