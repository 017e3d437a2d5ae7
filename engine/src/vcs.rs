//! Version-control diff source.
//!
//! When a file has no baseline and the VCS fallback is enabled, the diff
//! engine asks a [`DiffSource`] for a diff before synthesizing one. The
//! chain is tried in [`VcsMode`] order: HEAD against the working tree, then
//! the working tree against the index, then a tracked-file check.
//!
//! [`GitDiffSource`] implements the trait on top of the `git` command line.
//! Every invocation runs under a timeout and is killed if it expires.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::trace;

/// Which comparison to ask the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsMode {
    /// Committed HEAD against the working tree.
    HeadVsWorking,
    /// Staged index against the working tree.
    WorkingVsIndex,
    /// Whether the path is tracked at all. Returns the path when tracked and
    /// an empty string otherwise.
    IsTracked,
}

impl VcsMode {
    /// The fallback chain, in order of preference.
    pub const CHAIN: [VcsMode; 3] = [Self::HeadVsWorking, Self::WorkingVsIndex, Self::IsTracked];
}

impl fmt::Display for VcsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeadVsWorking => "head-vs-working",
            Self::WorkingVsIndex => "working-vs-index",
            Self::IsTracked => "is-tracked",
        };
        f.write_str(name)
    }
}

/// Errors from a diff-source provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VcsError {
    /// The provider binary could not be started.
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The provider exited unsuccessfully.
    #[error("{mode} failed with status {status}: {stderr}")]
    Failed {
        mode: VcsMode,
        status: i32,
        stderr: String,
    },

    /// The provider did not answer in time.
    #[error("{mode} timed out after {}ms", .timeout.as_millis())]
    Timeout { mode: VcsMode, timeout: Duration },
}

/// Produces unified diff text for a path from an external source.
#[async_trait]
pub trait DiffSource: Send + Sync + fmt::Debug {
    /// Returns the diff (or tracked marker) for `path` in the given mode.
    ///
    /// `path` is relative to the provider's root.
    async fn vcs_diff(&self, path: &str, mode: VcsMode) -> Result<String, VcsError>;
}

/// [`DiffSource`] backed by the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitDiffSource {
    root: PathBuf,
    timeout: Duration,
}

impl GitDiffSource {
    /// Creates a provider running git inside `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    fn args(path: &str, mode: VcsMode) -> Vec<&str> {
        match mode {
            VcsMode::HeadVsWorking => vec!["diff", "--no-color", "--unified=3", "HEAD", "--", path],
            VcsMode::WorkingVsIndex => vec!["diff", "--no-color", "--unified=3", "--", path],
            VcsMode::IsTracked => vec!["ls-files", "--error-unmatch", "--", path],
        }
    }
}

#[async_trait]
impl DiffSource for GitDiffSource {
    async fn vcs_diff(&self, path: &str, mode: VcsMode) -> Result<String, VcsError> {
        trace!(path, %mode, "Invoking git");

        let mut command = Command::new("git");
        command
            .args(Self::args(path, mode))
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| VcsError::Timeout {
                mode,
                timeout: self.timeout,
            })?
            .map_err(|e| VcsError::Spawn {
                program: "git".to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        // An untracked path is an answer, not a failure.
        if mode == VcsMode::IsTracked {
            return Ok(String::new());
        }

        Err(VcsError::Failed {
            mode,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
