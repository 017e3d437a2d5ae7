//! Unified diff parsing.
//!
//! Converts unified diff text into a [`LineChangeMap`]. Added lines are keyed
//! by their line number in the new file. Deleted lines have no new-file line
//! number; they are keyed by an opaque counter and additionally placed at the
//! new-file position the deletion occurred at, which is what the classifier
//! uses for its overlap counts.
//!
//! Lines before the first hunk header (`diff --git`, `index`, `---`, `+++`)
//! are ignored, as are `\ No newline at end of file` markers. The old/new
//! line counts of each hunk header are tracked so that a deleted line whose
//! text begins with `--` is never mistaken for a file header.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

/// Structured view of the lines touched by one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineChangeMap {
    /// New-file line number to added text.
    pub added: BTreeMap<u32, String>,
    /// Opaque monotonic index to deleted text.
    pub deleted: BTreeMap<u32, String>,
    /// New-file position of each deletion, in diff order.
    ///
    /// A run of deletions at the same point shares one position.
    pub deleted_positions: Vec<u32>,
    /// Every new-file line touched by an addition or a deletion.
    pub changed_lines: BTreeSet<u32>,
}

impl LineChangeMap {
    /// Returns `true` if the diff contained no additions or deletions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Texts of all added lines, in new-file order.
    pub fn added_text(&self) -> impl Iterator<Item = &str> {
        self.added.values().map(String::as_str)
    }

    /// Texts of all deleted lines, in diff order.
    pub fn deleted_text(&self) -> impl Iterator<Item = &str> {
        self.deleted.values().map(String::as_str)
    }

    /// Number of added lines within `[start, end]`.
    #[must_use]
    pub fn added_in(&self, start: u32, end: u32) -> u32 {
        count(self.added.range(start..=end).count())
    }

    /// Added texts within `[start, end]`.
    pub fn added_texts_in(&self, start: u32, end: u32) -> impl Iterator<Item = &str> {
        self.added.range(start..=end).map(|(_, text)| text.as_str())
    }

    /// Changed lines within `[start, end]`.
    pub fn changed_in(&self, start: u32, end: u32) -> impl Iterator<Item = u32> + '_ {
        self.changed_lines.range(start..=end).copied()
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex is valid")
    })
}

/// Parsed `@@ -a,b +c,d @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HunkHeader {
    old_len: u32,
    new_start: u32,
    new_len: u32,
}

fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let caps = hunk_header().captures(line)?;
    let num = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(1),
        }
    };
    Some(HunkHeader {
        old_len: num(2)?,
        new_start: num(3)?,
        new_len: num(4)?,
    })
}

/// Parses unified diff text into a [`LineChangeMap`].
///
/// Malformed input never fails; unrecognised lines are skipped.
///
/// # Example
///
/// ```
/// use deltascope_engine::diff::parse_unified_diff;
///
/// let diff = "@@ -1,3 +1,4 @@\n a\n+b\n c\n d\n";
/// let map = parse_unified_diff(diff);
/// assert_eq!(map.added.get(&2).map(String::as_str), Some("b"));
/// ```
#[must_use]
pub fn parse_unified_diff(diff_text: &str) -> LineChangeMap {
    let mut map = LineChangeMap::default();
    let mut line_no: u32 = 0;
    let mut old_remaining: u32 = 0;
    let mut new_remaining: u32 = 0;
    let mut in_hunk = false;
    let mut next_deleted: u32 = 0;

    for line in diff_text.lines() {
        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Some(header) => {
                    line_no = header.new_start;
                    old_remaining = header.old_len;
                    new_remaining = header.new_len;
                    in_hunk = old_remaining > 0 || new_remaining > 0;
                }
                None => in_hunk = false,
            }
            continue;
        }

        if !in_hunk || line.starts_with('\\') {
            continue;
        }

        if let Some(text) = line.strip_prefix('+') {
            map.added.insert(line_no, text.to_string());
            map.changed_lines.insert(line_no);
            line_no += 1;
            new_remaining = new_remaining.saturating_sub(1);
        } else if let Some(text) = line.strip_prefix('-') {
            map.deleted.insert(next_deleted, text.to_string());
            next_deleted += 1;
            map.deleted_positions.push(line_no);
            map.changed_lines.insert(line_no);
            old_remaining = old_remaining.saturating_sub(1);
        } else {
            line_no += 1;
            old_remaining = old_remaining.saturating_sub(1);
            new_remaining = new_remaining.saturating_sub(1);
        }

        if old_remaining == 0 && new_remaining == 0 {
            in_hunk = false;
        }
    }

    map
}
