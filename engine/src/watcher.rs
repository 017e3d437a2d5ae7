//! File-system watcher feeding the change engine.
//!
//! Watches a root directory recursively and emits a [`FileEvent`] with a
//! root-relative path for every add, change or unlink that passes the
//! [`PathFilter`].
//!
//! # Architecture
//!
//! The notify callback is kept lightweight: it maps the raw event kind,
//! filters paths and pushes the result through an internal channel. A
//! dedicated async task drains that channel, drops directory notifications
//! and forwards file events to the caller's sender.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use deltascope_engine::filter::PathFilter;
//! use deltascope_engine::watcher::FileWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let filter = PathFilter::from_patterns(Vec::<String>::new())?;
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let _watcher = FileWatcher::new(PathBuf::from("."), filter, tx)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{:?} {}", event.kind, event.path);
//!     }
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::filter::PathFilter;
use crate::types::{FileEvent, FileEventKind};

/// Errors that can occur during file watching operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to read a directory or file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    /// Failed to send event through the channel.
    #[error("failed to send event: channel closed")]
    ChannelClosed,
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Recursive watcher over one root directory.
#[derive(Debug)]
pub struct FileWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,

    /// Canonical root directory being watched.
    root: PathBuf,
}

impl FileWatcher {
    /// Starts watching `root` and forwarding accepted events to `sender`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or the watcher
    /// cannot be initialized.
    pub fn new(root: PathBuf, filter: PathFilter, sender: mpsc::Sender<FileEvent>) -> Result<Self> {
        if !root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(root));
        }
        let root = root.canonicalize()?;

        let (internal_tx, internal_rx) = mpsc::channel::<InternalEvent>(1000);

        tokio::spawn(forward_events(internal_rx, sender));

        let watcher = create_watcher(internal_tx, root.clone(), filter)?;

        info!(root = %root.display(), "Initialized file watcher");

        Ok(Self { watcher, root })
    }

    /// Returns the directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Events from the notify callback, processed by the async task.
#[derive(Debug)]
struct InternalEvent {
    absolute: PathBuf,
    event: FileEvent,
}

fn create_watcher(
    internal_tx: mpsc::Sender<InternalEvent>,
    root: PathBuf,
    filter: PathFilter,
) -> Result<RecommendedWatcher> {
    let callback_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            handle_notify_event(res, &callback_root, &filter, &internal_tx);
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    debug!(root = %root.display(), "Started recursive file watch");

    Ok(watcher)
}

/// Maps a notify event kind to the kind reported for each of its paths.
///
/// Renames are reported as an unlink of the old path and an add of the new
/// one. A removed folder is reported as an unlink of the folder path; the
/// engine forgets every tracked file below it.
fn map_event_kind(kind: &EventKind, paths: usize) -> Vec<FileEventKind> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => vec![FileEventKind::Add; paths],
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            vec![FileEventKind::Change; paths]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![FileEventKind::Unlink; paths],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![FileEventKind::Add; paths],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths == 2 => {
            vec![FileEventKind::Unlink, FileEventKind::Add]
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Folder | RemoveKind::Any) => {
            vec![FileEventKind::Unlink; paths]
        }
        _ => Vec::new(),
    }
}

/// Converts an absolute path under `root` to a `/`-separated relative path.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    root: &Path,
    filter: &PathFilter,
    internal_tx: &mpsc::Sender<InternalEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    let kinds = map_event_kind(&event.kind, event.paths.len());
    if kinds.is_empty() {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    }

    for (path, kind) in event.paths.iter().zip(kinds) {
        let Some(rel) = relative_path(root, path) else {
            continue;
        };
        if filter.is_ignored(&rel) {
            trace!(path = %rel, "Ignored path");
            continue;
        }

        let internal = InternalEvent {
            absolute: path.clone(),
            event: FileEvent::new(rel, kind),
        };
        // try_send keeps the notify thread from blocking; a full channel drops
        // the event.
        if let Err(e) = internal_tx.try_send(internal) {
            warn!(error = %e, "Failed to queue internal event, channel may be full");
        }
    }
}

async fn forward_events(mut rx: mpsc::Receiver<InternalEvent>, sender: mpsc::Sender<FileEvent>) {
    while let Some(InternalEvent { absolute, event }) = rx.recv().await {
        if event.kind != FileEventKind::Unlink && absolute.is_dir() {
            trace!(path = %event.path, "Skipping directory event");
            continue;
        }
        trace!(path = %event.path, kind = ?event.kind, "Forwarding file event");
        if sender.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping watcher task");
            break;
        }
    }

    debug!("Internal event processor shutting down");
}

/// Lists every file under `root` accepted by `filter`, as relative paths.
///
/// Unreadable directories are skipped. Symlinked directories are not
/// followed.
///
/// # Errors
///
/// Returns an error if `root` itself cannot be read.
pub fn scan_existing_files(root: &Path, filter: &PathFilter) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(WatcherError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(root)?;
    scan_entries(root, entries, filter, &mut files);

    files.sort();
    info!(file_count = files.len(), "Scanned existing files");
    Ok(files)
}

fn scan_directory_recursive(root: &Path, dir: &Path, filter: &PathFilter, files: &mut Vec<String>) {
    match fs::read_dir(dir) {
        Ok(entries) => scan_entries(root, entries, filter, files),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "Permission denied, skipping directory");
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read directory");
        }
    }
}

fn scan_entries(root: &Path, entries: fs::ReadDir, filter: &PathFilter, files: &mut Vec<String>) {
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            scan_directory_recursive(root, &path, filter, files);
        } else if file_type.is_file() {
            if let Some(rel) = relative_path(root, &path) {
                if filter.accepts(&rel) {
                    trace!(path = %rel, "Found existing file");
                    files.push(rel);
                }
            }
        }
    }
}
