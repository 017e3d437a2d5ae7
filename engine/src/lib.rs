//! Deltascope engine - incremental change detection with symbol attribution.
//!
//! This crate watches a source tree, keeps a baseline snapshot of every file it
//! has seen, and turns each saved edit into a [`types::ChangeEvent`] that names
//! the functions, classes and values the edit touched.
//!
//! # Overview
//!
//! Filesystem notifications are debounced per path. When a path settles the
//! engine diffs the current content against the baseline, drops edits that
//! only touch comments or whitespace, parses the file into symbols, and
//! attributes every changed line to the innermost symbol that covers it. The
//! baseline only advances once an event has been reported, so the next diff
//! contains exactly the edits made since the last report.
//!
//! # Modules
//!
//! - [`engine`]: The change pipeline tying everything together
//! - [`watcher`]: File system watcher and initial directory scan
//! - [`snapshot`]: Baseline and last-known content per file
//! - [`diff`]: Unified diff production, caching and parsing
//! - [`vcs`]: Git-backed diffs for files without a baseline
//! - [`noise`]: Comment and whitespace-only edit detection
//! - [`symbols`]: Parser seam and line-to-symbol attribution
//! - [`outline`]: Built-in lightweight symbol parser
//! - [`classify`]: Change kinds, whole-symbol deletions and call relations
//! - [`history`]: Category consolidation and bounded per-file history
//! - [`filter`]: Ignore patterns
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for engine operations
//! - [`types`]: Event and symbol types
//! - [`utils`]: Shared utilities (debouncing, etc.)

pub mod classify;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod filter;
pub mod history;
pub mod noise;
pub mod outline;
pub mod snapshot;
pub mod symbols;
pub mod types;
pub mod utils;
pub mod vcs;
pub mod watcher;

pub use classify::{ChangeClassifier, SymbolMemory};
pub use config::{ConfigError, EngineConfig};
pub use diff::{DiffEngine, DiffError, DiffOutcome, LineChangeMap};
pub use engine::{ChangeEngine, EngineBuilder, ProcessOutcome};
pub use error::{EngineError, Result};
pub use filter::{GlobIgnore, IgnoreMatcher, PathFilter};
pub use history::{ChangeConsolidator, ChangeHistory};
pub use noise::NoiseFilter;
pub use outline::OutlineParser;
pub use snapshot::SnapshotStore;
pub use symbols::{ParseOutcome, SymbolParser};
pub use types::{
    AttributedChange, CallRelation, ChangeCategory, ChangeEvent, ChangeKind, ChangeSummary,
    EngineEvent, FileEvent, FileEventKind, ParsedSymbols, SymbolKind, SymbolRange,
};
pub use utils::{DebounceScheduler, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use vcs::{DiffSource, GitDiffSource, VcsError};
pub use watcher::{scan_existing_files, FileWatcher, WatcherError};
