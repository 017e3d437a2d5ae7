//! Symbol parsing seam and changed-line attribution.
//!
//! The engine does not parse source itself. A [`SymbolParser`] supplies
//! symbol ranges and call sites as byte offsets; [`LineIndex`] converts them
//! to 1-based lines in the current content, and [`SymbolAttributor`] maps
//! each changed line to the innermost symbol containing it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::diff::LineChangeMap;
use crate::types::{CallSite, ParsedSymbols, SymbolKind, SymbolRange};

/// Result of asking a parser for the symbols of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The file was parsed.
    Parsed(ParsedSymbols),
    /// The language is not supported; not an error.
    Unsupported,
    /// The parser failed.
    Failed(String),
}

/// Supplies symbol ranges and call sites for file content.
pub trait SymbolParser: Send + Sync + fmt::Debug {
    /// Parses `content` of the file at `path`.
    fn parse_symbols(&self, path: &str, content: &str) -> ParseOutcome;
}

/// Byte offset to line number lookup for one content string.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    #[must_use]
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            content
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: content.len(),
        }
    }

    /// 1-based line containing `offset`. Offsets past the end map to the
    /// last line.
    #[must_use]
    pub fn line_of(&self, offset: usize) -> u32 {
        let offset = offset.min(self.len);
        let line = self.line_starts.partition_point(|&start| start <= offset);
        u32::try_from(line.max(1)).unwrap_or(u32::MAX)
    }

    /// Inclusive 1-based line span of the byte range `[start, end)`.
    #[must_use]
    pub fn span(&self, start: usize, end: usize) -> (u32, u32) {
        let first = self.line_of(start);
        let last = if end > start { self.line_of(end - 1) } else { first };
        (first, last.max(first))
    }
}

/// A symbol with its range converted to lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
}

impl ResolvedSymbol {
    /// Qualified name when available, otherwise the plain name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or(&self.name)
    }

    /// `end_line - start_line`.
    #[must_use]
    pub fn span(&self) -> u32 {
        self.end_line - self.start_line
    }

    #[must_use]
    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// True if `other` lies within this symbol and is not the same range.
    #[must_use]
    pub fn strictly_contains(&self, other: &ResolvedSymbol) -> bool {
        self.start_line <= other.start_line
            && other.end_line <= self.end_line
            && (self.start_line, self.end_line) != (other.start_line, other.end_line)
    }
}

/// A call site resolved to its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCall {
    pub callee: String,
    pub line: u32,
}

/// Parser output resolved against one content string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub symbols: Vec<ResolvedSymbol>,
    pub calls: Vec<ResolvedCall>,
}

impl SymbolTable {
    /// Converts byte ranges from `parsed` into lines of `content`.
    #[must_use]
    pub fn resolve(parsed: &ParsedSymbols, content: &str) -> Self {
        let index = LineIndex::new(content);
        let symbols = parsed
            .symbols
            .iter()
            .map(|s: &SymbolRange| {
                let (start_line, end_line) = index.span(s.start_offset, s.end_offset);
                ResolvedSymbol {
                    kind: s.kind,
                    name: s.name.clone(),
                    qualified_name: s.qualified_name.clone(),
                    start_line,
                    end_line,
                }
            })
            .collect();
        let calls = parsed
            .calls
            .iter()
            .map(|c: &CallSite| ResolvedCall {
                callee: c.callee.clone(),
                line: index.line_of(c.start_offset),
            })
            .collect();
        Self { symbols, calls }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Maps changed lines to the symbols that contain them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolAttributor;

impl SymbolAttributor {
    /// For every changed line, the index of the innermost containing symbol.
    ///
    /// Ties on span go to the symbol that starts later. Lines outside every
    /// symbol are dropped.
    #[must_use]
    pub fn attribute(
        &self,
        symbols: &[ResolvedSymbol],
        changed_lines: &BTreeSet<u32>,
    ) -> BTreeMap<u32, usize> {
        changed_lines
            .iter()
            .filter_map(|&line| innermost(symbols, line, false).map(|idx| (line, idx)))
            .collect()
    }

    /// Like [`Self::attribute`], but aware of which lines are deletion-only.
    ///
    /// A deletion with no addition at the same position sits in the gap
    /// before its line, so it belongs to a symbol only if that gap is inside
    /// the symbol (`start_line < line <= end_line`). A function removed from
    /// between two others is therefore not charged to the one that follows.
    #[must_use]
    pub fn attribute_changes(
        &self,
        symbols: &[ResolvedSymbol],
        changes: &LineChangeMap,
    ) -> BTreeMap<u32, usize> {
        changes
            .changed_lines
            .iter()
            .filter_map(|&line| {
                let deletion_only = !changes.added.contains_key(&line);
                innermost(symbols, line, deletion_only).map(|idx| (line, idx))
            })
            .collect()
    }

    /// For every symbol, the index of its nearest strictly-containing symbol.
    #[must_use]
    pub fn parent_map(&self, symbols: &[ResolvedSymbol]) -> HashMap<usize, usize> {
        let mut parents = HashMap::new();
        for (i, symbol) in symbols.iter().enumerate() {
            let parent = symbols
                .iter()
                .enumerate()
                .filter(|(j, candidate)| *j != i && candidate.strictly_contains(symbol))
                .min_by_key(|(_, candidate)| candidate.span())
                .map(|(j, _)| j);
            if let Some(j) = parent {
                parents.insert(i, j);
            }
        }
        parents
    }

    /// Symbols to report for this diff, in source order.
    ///
    /// A container is reported only if one of its changed lines lies outside
    /// every symbol nested in it; otherwise the nested symbols stand for it.
    #[must_use]
    pub fn touched_symbols(&self, symbols: &[ResolvedSymbol], changes: &LineChangeMap) -> Vec<usize> {
        let attribution = self.attribute_changes(symbols, changes);
        let mut touched: Vec<usize> = attribution.values().copied().collect();
        touched.sort_unstable();
        touched.dedup();

        touched.retain(|&idx| {
            let symbol = &symbols[idx];
            if !symbol.kind.is_container() {
                return true;
            }
            attribution
                .iter()
                .filter(|(_, &owner)| owner == idx)
                .any(|(&line, _)| {
                    let deletion_only = !changes.added.contains_key(&line);
                    !symbols.iter().any(|nested| {
                        symbol.strictly_contains(nested) && covers(nested, line, deletion_only)
                    })
                })
        });

        touched.sort_by_key(|&idx| (symbols[idx].start_line, idx));
        touched
    }
}

/// Whether a changed line counts toward `symbol`.
#[must_use]
pub fn covers(symbol: &ResolvedSymbol, line: u32, deletion_only: bool) -> bool {
    symbol.contains_line(line) && (!deletion_only || symbol.start_line < line)
}

fn innermost(symbols: &[ResolvedSymbol], line: u32, deletion_only: bool) -> Option<usize> {
    symbols
        .iter()
        .enumerate()
        .filter(|(_, s)| covers(s, line, deletion_only))
        .min_by(|(_, a), (_, b)| a.span().cmp(&b.span()).then(b.start_line.cmp(&a.start_line)))
        .map(|(i, _)| i)
}
