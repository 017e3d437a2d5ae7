//! Error types for the Deltascope engine.
//!
//! Each concern defines its own error enum next to the code that produces it
//! ([`ConfigError`], [`FilterError`], [`WatcherError`], [`DiffError`],
//! [`VcsError`]). [`EngineError`] wraps them for callers that only need a
//! single type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::diff::DiffError;
use crate::filter::FilterError;
use crate::vcs::VcsError;
use crate::watcher::WatcherError;

/// Errors that can occur while constructing or driving a [`crate::ChangeEngine`].
///
/// Per-file processing failures never surface here: a failing file simply
/// produces no event for that cycle. This type covers setup and I/O that
/// affects the engine as a whole.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid ignore-list pattern.
    #[error("ignore list error: {0}")]
    Filter(#[from] FilterError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// Diff computation error.
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    /// Version-control provider error.
    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    /// The event channel to the presentation layer was closed.
    #[error("event channel closed")]
    ChannelClosed,
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
