//! Diff production and parsing.
//!
//! - [`engine`]: computes unified diffs against the stored baseline
//! - [`parser`]: turns unified diff text into per-line change maps

pub mod engine;
pub mod parser;

pub use engine::{
    synthesize_new_file_diff, unified_diff, DiffEngine, DiffError, DiffOutcome, CONTEXT_LINES,
};
pub use parser::{parse_unified_diff, LineChangeMap};
