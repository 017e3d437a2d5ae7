//! Configuration for the Deltascope engine.
//!
//! [`EngineConfig::default`] gives sensible values for embedding the engine as
//! a library. [`EngineConfig::from_env`] layers environment variables on top.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DELTASCOPE_ROOT` | No | current directory | Root directory to watch |
//! | `DELTASCOPE_DEBOUNCE_MS` | No | 150 | Quiet period before a file is processed (max 2000) |
//! | `DELTASCOPE_DIFF_CACHE_TTL_MS` | No | 2000 | Lifetime of a cached diff |
//! | `DELTASCOPE_DIFF_CACHE_CAPACITY` | No | 256 | Maximum number of cached diffs |
//! | `DELTASCOPE_DIFF_TIMEOUT_MS` | No | 5000 | Timeout for a single read or VCS call |
//! | `DELTASCOPE_HISTORY_LIMIT` | No | 50 | Change events retained per file |
//! | `DELTASCOPE_IGNORE` | No | (none) | Comma-separated extra ignore globs |
//! | `DELTASCOPE_VCS_FALLBACK` | No | false | Consult git when a file has no baseline |
//! | `DELTASCOPE_CHANNEL_CAPACITY` | No | 1000 | Capacity of the event channels |
//!
//! # Example
//!
//! ```no_run
//! use deltascope_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_env().expect("Failed to load configuration");
//! println!("Watching: {}", config.root.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::utils::DEFAULT_DEBOUNCE_MS;

/// Upper bound for the debounce delay.
const MAX_DEBOUNCE_MS: u64 = 2000;

/// Default lifetime of a cached diff.
const DEFAULT_DIFF_CACHE_TTL_MS: u64 = 2000;

/// Default number of cached diffs.
const DEFAULT_DIFF_CACHE_CAPACITY: usize = 256;

/// Default timeout for reads and VCS calls.
const DEFAULT_DIFF_TIMEOUT_MS: u64 = 5000;

/// Default number of history entries kept per file.
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default capacity for event channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The current directory could not be determined for the default root.
    #[error("failed to determine current directory: {0}")]
    NoWorkingDirectory(#[source] std::io::Error),
}

/// Configuration for a [`crate::ChangeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root directory whose files are tracked.
    pub root: PathBuf,

    /// Quiet period after the last notification before a file is processed.
    pub debounce: Duration,

    /// How long a computed diff may be served from cache.
    pub diff_cache_ttl: Duration,

    /// Maximum number of cached diffs.
    pub diff_cache_capacity: usize,

    /// Timeout for reading a file or invoking the VCS provider.
    pub diff_timeout: Duration,

    /// Change events retained per file.
    pub history_limit: usize,

    /// Ignore globs applied on top of the built-in list.
    pub ignore_patterns: Vec<String>,

    /// Whether to consult version control when no baseline exists.
    pub vcs_fallback: bool,

    /// Capacity of the engine's event channels.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            diff_cache_ttl: Duration::from_millis(DEFAULT_DIFF_CACHE_TTL_MS),
            diff_cache_capacity: DEFAULT_DIFF_CACHE_CAPACITY,
            diff_timeout: Duration::from_millis(DEFAULT_DIFF_TIMEOUT_MS),
            history_limit: DEFAULT_HISTORY_LIMIT,
            ignore_patterns: Vec::new(),
            vcs_fallback: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration rooted at `root`.
    #[must_use]
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Creates a new `EngineConfig` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a numeric variable cannot be parsed
    /// - `DELTASCOPE_DEBOUNCE_MS` exceeds 2000
    /// - a capacity or limit is zero
    /// - `DELTASCOPE_ROOT` is unset and the current directory is unavailable
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = match env::var("DELTASCOPE_ROOT") {
            Ok(val) => PathBuf::from(val),
            Err(_) => env::current_dir().map_err(ConfigError::NoWorkingDirectory)?,
        };

        let debounce_ms = parse_var("DELTASCOPE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        if debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::InvalidValue {
                key: "DELTASCOPE_DEBOUNCE_MS".to_string(),
                message: format!("debounce must be at most {MAX_DEBOUNCE_MS}ms, got {debounce_ms}"),
            });
        }

        let ttl_ms = parse_var("DELTASCOPE_DIFF_CACHE_TTL_MS", DEFAULT_DIFF_CACHE_TTL_MS)?;
        let diff_cache_capacity =
            parse_positive("DELTASCOPE_DIFF_CACHE_CAPACITY", DEFAULT_DIFF_CACHE_CAPACITY)?;
        let timeout_ms = parse_positive("DELTASCOPE_DIFF_TIMEOUT_MS", DEFAULT_DIFF_TIMEOUT_MS)?;
        let history_limit = parse_positive("DELTASCOPE_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let channel_capacity =
            parse_positive("DELTASCOPE_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?;

        let ignore_patterns = env::var("DELTASCOPE_IGNORE")
            .map(|val| {
                val.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let vcs_fallback = match env::var("DELTASCOPE_VCS_FALLBACK") {
            Ok(val) => parse_bool("DELTASCOPE_VCS_FALLBACK", &val)?,
            Err(_) => false,
        };

        Ok(Self {
            root,
            debounce: Duration::from_millis(debounce_ms),
            diff_cache_ttl: Duration::from_millis(ttl_ms),
            diff_cache_capacity,
            diff_timeout: Duration::from_millis(timeout_ms),
            history_limit,
            ignore_patterns,
            vcs_fallback,
            channel_capacity,
        })
    }
}

/// Parses an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected non-negative integer, got '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_var`], but rejects zero.
fn parse_positive<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let value = parse_var(key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all DELTASCOPE_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("DELTASCOPE_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        let leaked: Vec<String> = env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("DELTASCOPE_"))
            .collect();
        for key in leaked {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        with_clean_env(|| {
            let config = EngineConfig::from_env().expect("should parse empty env");

            assert_eq!(config.root, env::current_dir().unwrap());
            assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
            assert_eq!(config.diff_cache_capacity, DEFAULT_DIFF_CACHE_CAPACITY);
            assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
            assert!(config.ignore_patterns.is_empty());
            assert!(!config.vcs_fallback);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("DELTASCOPE_ROOT", "/work/project");
            env::set_var("DELTASCOPE_DEBOUNCE_MS", "80");
            env::set_var("DELTASCOPE_DIFF_CACHE_TTL_MS", "500");
            env::set_var("DELTASCOPE_DIFF_CACHE_CAPACITY", "16");
            env::set_var("DELTASCOPE_DIFF_TIMEOUT_MS", "1500");
            env::set_var("DELTASCOPE_HISTORY_LIMIT", "5");
            env::set_var("DELTASCOPE_IGNORE", "dist/**, *.log ,,");
            env::set_var("DELTASCOPE_VCS_FALLBACK", "true");
            env::set_var("DELTASCOPE_CHANNEL_CAPACITY", "64");

            let config = EngineConfig::from_env().expect("should parse full config");

            assert_eq!(config.root, PathBuf::from("/work/project"));
            assert_eq!(config.debounce, Duration::from_millis(80));
            assert_eq!(config.diff_cache_ttl, Duration::from_millis(500));
            assert_eq!(config.diff_cache_capacity, 16);
            assert_eq!(config.diff_timeout, Duration::from_millis(1500));
            assert_eq!(config.history_limit, 5);
            assert_eq!(
                config.ignore_patterns,
                vec!["dist/**".to_string(), "*.log".to_string()]
            );
            assert!(config.vcs_fallback);
            assert_eq!(config.channel_capacity, 64);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_debounce() {
        with_clean_env(|| {
            env::set_var("DELTASCOPE_DEBOUNCE_MS", "soon");

            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "DELTASCOPE_DEBOUNCE_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_debounce_upper_bound() {
        with_clean_env(|| {
            env::set_var("DELTASCOPE_DEBOUNCE_MS", "5000");

            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "DELTASCOPE_DEBOUNCE_MS" && message.contains("at most 2000ms")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_history_limit_rejected() {
        with_clean_env(|| {
            env::set_var("DELTASCOPE_HISTORY_LIMIT", "0");

            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "DELTASCOPE_HISTORY_LIMIT" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_boolean_rejected() {
        with_clean_env(|| {
            env::set_var("DELTASCOPE_VCS_FALLBACK", "maybe");

            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "DELTASCOPE_VCS_FALLBACK"
            ));
        });
    }

    #[test]
    fn test_for_root_keeps_defaults() {
        let config = EngineConfig::for_root("/tmp/x");
        assert_eq!(config.root, PathBuf::from("/tmp/x"));
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("K", "YES").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
    }
}
