//! Utility modules for the Deltascope engine.
//!
//! # Modules
//!
//! - [`debounce`]: Keyed debounce scheduling for coalescing rapid file events

pub mod debounce;

pub use debounce::{DebounceScheduler, DebouncerError, DEFAULT_DEBOUNCE_MS};
