//! Path filtering against an ignore list.
//!
//! [`PathFilter`] is the first stage of the pipeline: every watcher
//! notification and every file found by the initial scan is checked against
//! it. The actual matching is delegated to an [`IgnoreMatcher`] so hosts can
//! plug in their own ignore semantics; [`GlobIgnore`] is the default.

use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Patterns that are always ignored.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/*.swp",
    "**/*~",
    "**/.DS_Store",
];

/// Errors that can occur while building an ignore list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// A glob pattern could not be compiled.
    #[error("invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Decides whether a path relative to the watched root is excluded.
pub trait IgnoreMatcher: Send + Sync + fmt::Debug {
    /// Returns `true` if `relative_path` should be excluded.
    fn should_ignore(&self, relative_path: &str) -> bool;
}

/// Glob-based ignore matcher.
#[derive(Debug, Clone)]
pub struct GlobIgnore {
    set: GlobSet,
    patterns: Vec<String>,
}

impl GlobIgnore {
    /// Compiles the given glob patterns.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] for the first pattern that does
    /// not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let set = builder.build().map_err(|e| FilterError::InvalidPattern {
            pattern: kept.join(","),
            message: e.to_string(),
        })?;

        Ok(Self {
            set,
            patterns: kept,
        })
    }

    /// Compiles [`DEFAULT_IGNORE_PATTERNS`] plus `extra`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] if any extra pattern is invalid.
    pub fn with_defaults<I, S>(extra: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        patterns.extend(extra.into_iter().map(|p| p.as_ref().to_string()));
        Self::new(patterns)
    }

    /// Returns the compiled patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl IgnoreMatcher for GlobIgnore {
    fn should_ignore(&self, relative_path: &str) -> bool {
        self.set.is_match(relative_path)
    }
}

/// Predicate wrapper around an [`IgnoreMatcher`].
#[derive(Debug, Clone)]
pub struct PathFilter {
    matcher: Arc<dyn IgnoreMatcher>,
}

impl PathFilter {
    /// Wraps a custom matcher.
    #[must_use]
    pub fn new(matcher: Arc<dyn IgnoreMatcher>) -> Self {
        Self { matcher }
    }

    /// Builds a filter from the default ignore list plus `extra` globs.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] if any extra pattern is invalid.
    pub fn from_patterns<I, S>(extra: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(Arc::new(GlobIgnore::with_defaults(extra)?)))
    }

    /// Returns `true` if the path must be excluded from tracking.
    ///
    /// Backslashes are normalized to `/` before matching.
    #[must_use]
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        if relative_path.is_empty() {
            return true;
        }
        if relative_path.contains('\\') {
            return self
                .matcher
                .should_ignore(&relative_path.replace('\\', "/"));
        }
        self.matcher.should_ignore(relative_path)
    }

    /// Inverse of [`Self::is_ignored`].
    #[must_use]
    pub fn accepts(&self, relative_path: &str) -> bool {
        !self.is_ignored(relative_path)
    }
}
