//! Consolidation of one diff's changes and the per-file event history.

use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;

use crate::diff::LineChangeMap;
use crate::types::{AttributedChange, ChangeCategory, ChangeEvent, ChangeKind, ChangeSummary};

struct CategoryPatterns {
    api_call: Regex,
    api_exposure: Regex,
    external_read: Regex,
}

fn patterns() -> &'static CategoryPatterns {
    static PATTERNS: OnceLock<CategoryPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CategoryPatterns {
        api_call: Regex::new(
            r"\b(fetch|axios|reqwest|requests|urllib|http|https|XMLHttpRequest|grpc)\b\s*[.:(]",
        )
        .expect("api call regex is valid"),
        api_exposure: Regex::new(
            r"(#\[(get|post|put|delete|patch|route)\b|@(app|router|api)\.(get|post|put|delete|patch|route)\b|\b(app|router)\.(get|post|put|delete|patch|use)\s*\(|\.route\s*\()",
        )
        .expect("api exposure regex is valid"),
        external_read: Regex::new(
            r"\b(read_to_string|readFile|readFileSync|open|getenv|env::var|process\.env|File::open|fs::read)\b",
        )
        .expect("external read regex is valid"),
    })
}

/// Merges the attributed changes of one diff into a single summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeConsolidator;

impl ChangeConsolidator {
    /// Category of one attributed change, given the added text of its lines.
    #[must_use]
    pub fn categorize(&self, change: &AttributedChange, added_text: &str) -> ChangeCategory {
        let callable = change.symbol_kind.is_callable();
        match change.change_type {
            ChangeKind::Deleted if callable => return ChangeCategory::FunctionDeleted,
            ChangeKind::Deleted => return ChangeCategory::CodeDeleted,
            ChangeKind::Added if callable => return ChangeCategory::FunctionAdded,
            _ => {}
        }

        let p = patterns();
        if p.api_exposure.is_match(added_text) {
            ChangeCategory::ApiExposure
        } else if p.api_call.is_match(added_text) {
            ChangeCategory::ApiCall
        } else if p.external_read.is_match(added_text) {
            ChangeCategory::ExternalRead
        } else {
            match change.change_type {
                ChangeKind::Added => ChangeCategory::LogicAdded,
                ChangeKind::Deleted | ChangeKind::Modified | ChangeKind::ValueChanged => {
                    ChangeCategory::LogicChanged
                }
            }
        }
    }

    /// Builds one summary for all `changes` of a diff.
    ///
    /// The primary category is the most frequent one; ties go to the earlier
    /// category in [`ChangeCategory::ALL`]. Returns `None` for no changes.
    #[must_use]
    pub fn consolidate(&self, changes: &[AttributedChange], lines: &LineChangeMap) -> Option<ChangeSummary> {
        if changes.is_empty() {
            return None;
        }

        let mut tally: HashMap<ChangeCategory, u32> = HashMap::new();
        for change in changes {
            // Deleted ranges may be numbered against the previous content.
            let text = if change.change_type == ChangeKind::Deleted {
                String::new()
            } else {
                let added: Vec<&str> = lines.added_texts_in(change.start_line, change.end_line).collect();
                added.join("\n")
            };
            *tally.entry(self.categorize(change, &text)).or_default() += 1;
        }

        let counts: Vec<(ChangeCategory, u32)> = ChangeCategory::ALL
            .iter()
            .filter_map(|c| tally.get(c).map(|&n| (*c, n)))
            .collect();

        let (primary, _) = counts
            .iter()
            .copied()
            .fold(None::<(ChangeCategory, u32)>, |best, (c, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((c, n)),
            })?;

        let summary = counts
            .iter()
            .map(|(c, n)| format!("{}: {n}", c.label()))
            .collect::<Vec<_>>()
            .join(", ");

        let first_line = changes
            .iter()
            .filter(|c| c.change_type != ChangeKind::Deleted)
            .map(|c| c.start_line)
            .min()
            .or_else(|| changes.iter().map(|c| c.start_line).min())
            .unwrap_or(1);

        let mut comments: Vec<String> = Vec::new();
        for comment in changes.iter().flat_map(|c| c.comments.iter()) {
            if !comments.contains(comment) {
                comments.push(comment.clone());
            }
        }

        Some(ChangeSummary {
            primary,
            counts,
            summary,
            first_line,
            comments,
        })
    }
}

/// Bounded per-file list of reported events, oldest first.
#[derive(Debug, Clone)]
pub struct ChangeHistory {
    limit: usize,
    entries: HashMap<String, VecDeque<ChangeEvent>>,
}

impl ChangeHistory {
    /// Creates a history keeping at most `limit` events per file.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: HashMap::new(),
        }
    }

    /// Appends `event`, evicting the oldest entry past the limit.
    pub fn push(&mut self, event: ChangeEvent) {
        let list = self.entries.entry(event.file_path.clone()).or_default();
        list.push_back(event);
        while list.len() > self.limit {
            list.pop_front();
        }
    }

    /// All retained events for `path`, oldest first.
    #[must_use]
    pub fn get(&self, path: &str) -> Vec<ChangeEvent> {
        self.entries
            .get(path)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained events for `path` except the most recent one.
    #[must_use]
    pub fn previous(&self, path: &str) -> Vec<ChangeEvent> {
        let mut all = self.get(path);
        all.pop();
        all
    }

    /// Number of retained events for `path`.
    #[must_use]
    pub fn len(&self, path: &str) -> usize {
        self.entries.get(path).map_or(0, VecDeque::len)
    }

    /// Discards the history of `path`. Returns `true` if any existed.
    pub fn forget(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
