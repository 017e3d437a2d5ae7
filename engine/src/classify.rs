//! Change classification per attributed symbol.
//!
//! [`ChangeClassifier`] decides whether each touched symbol was added,
//! modified, deleted or had its value changed, using the share of its lines
//! that were added or deleted. Symbols that vanished entirely are found by
//! [`SymbolMemory`], which compares against the symbols seen after the last
//! reported change. Call edges between touched symbols are extracted from the
//! added lines and from the parser's call sites.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::trace;

use crate::diff::LineChangeMap;
use crate::noise::NoiseFilter;
use crate::symbols::{covers, ResolvedSymbol, SymbolAttributor, SymbolTable};
use crate::types::{AttributedChange, CallRelation, ChangeKind, SymbolKind};

/// Share of a symbol's span that must be added (or deleted) for the whole
/// symbol to count as added (or deleted).
pub const WHOLE_SYMBOL_RATIO: f64 = 0.8;

/// Added and deleted line counts inside one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    pub added: u32,
    pub deleted: u32,
}

impl LineCounts {
    /// Counts the changes of `changes` that fall inside `symbol`.
    #[must_use]
    pub fn within(symbol: &ResolvedSymbol, changes: &LineChangeMap) -> Self {
        let added = changes.added_in(symbol.start_line, symbol.end_line);
        let deleted = changes
            .deleted_positions
            .iter()
            .filter(|&&line| covers(symbol, line, !changes.added.contains_key(&line)))
            .count();
        Self {
            added,
            deleted: u32::try_from(deleted).unwrap_or(u32::MAX),
        }
    }
}

/// Classifies attributed symbols and extracts call relations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeClassifier {
    attributor: SymbolAttributor,
}

impl ChangeClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a single symbol.
    ///
    /// The returned change has no parent and no comments; [`Self::classify_all`]
    /// fills those in.
    #[must_use]
    pub fn classify(
        &self,
        symbol: &ResolvedSymbol,
        file_path: &str,
        changes: &LineChangeMap,
        is_new_file: bool,
    ) -> AttributedChange {
        let span = symbol.span();

        let (change_type, change_amount) = if is_new_file {
            (ChangeKind::Added, span.max(1))
        } else {
            let counts = LineCounts::within(symbol, changes);
            let threshold = WHOLE_SYMBOL_RATIO * f64::from(span);
            let kind = if f64::from(counts.added) > threshold && counts.deleted == 0 {
                ChangeKind::Added
            } else if f64::from(counts.deleted) > threshold && counts.added == 0 {
                ChangeKind::Deleted
            } else if is_value_change(symbol, changes, counts) {
                ChangeKind::ValueChanged
            } else {
                ChangeKind::Modified
            };
            (kind, (counts.added + counts.deleted).max(1))
        };

        AttributedChange {
            symbol_kind: symbol.kind,
            symbol_name: symbol.display_name().to_string(),
            change_type,
            file_path: file_path.to_string(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            change_amount,
            parent_symbol: None,
            comments: Vec::new(),
        }
    }

    /// Classifies every symbol touched by `changes`, in source order.
    ///
    /// Symbols whose own lines are noise are skipped, and each
    /// `(kind, name, start_line)` is reported once.
    #[must_use]
    pub fn classify_all(
        &self,
        table: &SymbolTable,
        file_path: &str,
        changes: &LineChangeMap,
        is_new_file: bool,
        noise: &NoiseFilter,
    ) -> Vec<AttributedChange> {
        let symbols = &table.symbols;
        let parents = self.attributor.parent_map(symbols);
        let mut seen: HashSet<(SymbolKind, String, u32)> = HashSet::new();
        let mut out = Vec::new();

        for idx in self.attributor.touched_symbols(symbols, changes) {
            let symbol = &symbols[idx];
            let added: Vec<&str> = changes
                .added_texts_in(symbol.start_line, symbol.end_line)
                .collect();
            let deleted: Vec<&str> = changes
                .deleted_positions
                .iter()
                .zip(changes.deleted.values())
                .filter(|(&line, _)| covers(symbol, line, !changes.added.contains_key(&line)))
                .map(|(_, text)| text.as_str())
                .collect();

            if noise.is_noise(added.iter().copied(), deleted.iter().copied()) {
                trace!(file_path, symbol = symbol.display_name(), "Symbol change is noise");
                continue;
            }

            let key = (symbol.kind, symbol.display_name().to_string(), symbol.start_line);
            if !seen.insert(key) {
                continue;
            }

            let mut change = self.classify(symbol, file_path, changes, is_new_file);
            change.parent_symbol = parents.get(&idx).map(|&p| symbols[p].display_name().to_string());
            change.comments = noise.comments(added.iter().copied());
            out.push(change);
        }

        out
    }

    /// Call edges between symbols touched by this diff.
    ///
    /// Identifiers followed by `(` on added lines are matched against the
    /// names of the other touched symbols, then the parser's own call sites on
    /// changed lines are matched the same way. Edges are deduplicated.
    #[must_use]
    pub fn call_relations(
        &self,
        table: &SymbolTable,
        file_path: &str,
        changes: &LineChangeMap,
    ) -> Vec<CallRelation> {
        let symbols = &table.symbols;
        let attribution = self.attributor.attribute_changes(symbols, changes);

        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for &idx in attribution.values() {
            by_name.entry(symbols[idx].name.as_str()).or_insert(idx);
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |from: usize, callee: &str| {
            let Some(&to) = by_name.get(callee) else {
                return;
            };
            if to == from {
                return;
            }
            let relation = CallRelation {
                from_symbol: symbols[from].display_name().to_string(),
                to_symbol: symbols[to].display_name().to_string(),
                file_path: file_path.to_string(),
            };
            if seen.insert(relation.clone()) {
                out.push(relation);
            }
        };

        for (line, text) in &changes.added {
            let Some(&from) = attribution.get(line) else {
                continue;
            };
            for caps in call_pattern().captures_iter(text) {
                if let Some(callee) = caps.get(1) {
                    push(from, callee.as_str());
                }
            }
        }

        for call in &table.calls {
            if !changes.changed_lines.contains(&call.line) {
                continue;
            }
            if let Some(&from) = attribution.get(&call.line) {
                push(from, &call.callee);
            }
        }

        out
    }
}

/// A value symbol whose declaration line was replaced and nothing else.
fn is_value_change(symbol: &ResolvedSymbol, changes: &LineChangeMap, counts: LineCounts) -> bool {
    symbol.kind.is_value()
        && counts.added > 0
        && counts.added == counts.deleted
        && changes
            .changed_in(symbol.start_line, symbol.end_line)
            .all(|line| line == symbol.start_line)
}

fn call_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call regex is valid"))
}

/// A symbol remembered from the last reported state of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub parent: Option<String>,
}

/// Per-file record of the symbols present after the last reported change.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct SymbolMemory {
    inner: Arc<RwLock<HashMap<String, Vec<RememberedSymbol>>>>,
}

impl SymbolMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the symbols of `table` as the current state of `path`.
    pub async fn remember(&self, path: &str, table: &SymbolTable) {
        let parents = SymbolAttributor.parent_map(&table.symbols);
        let remembered = table
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| RememberedSymbol {
                kind: s.kind,
                name: s.display_name().to_string(),
                start_line: s.start_line,
                end_line: s.end_line,
                parent: parents.get(&i).map(|&p| table.symbols[p].display_name().to_string()),
            })
            .collect();
        self.inner.write().await.insert(path.to_string(), remembered);
    }

    /// Symbols remembered for `path` that are absent from `table`, reported
    /// as deleted.
    ///
    /// A symbol whose remembered parent also vanished is folded into the
    /// parent's deletion.
    pub async fn deleted_since(&self, path: &str, table: &SymbolTable) -> Vec<AttributedChange> {
        let guard = self.inner.read().await;
        let Some(previous) = guard.get(path) else {
            return Vec::new();
        };

        let current: HashSet<(SymbolKind, &str)> = table
            .symbols
            .iter()
            .map(|s| (s.kind, s.display_name()))
            .collect();
        let gone: Vec<&RememberedSymbol> = previous
            .iter()
            .filter(|s| !current.contains(&(s.kind, s.name.as_str())))
            .collect();
        let gone_names: HashSet<&str> = gone.iter().map(|s| s.name.as_str()).collect();

        gone.iter()
            .filter(|s| {
                s.parent
                    .as_deref()
                    .map_or(true, |parent| !gone_names.contains(parent))
            })
            .map(|s| AttributedChange {
                symbol_kind: s.kind,
                symbol_name: s.name.clone(),
                change_type: ChangeKind::Deleted,
                file_path: path.to_string(),
                start_line: s.start_line,
                end_line: s.end_line,
                change_amount: (s.end_line - s.start_line + 1).max(1),
                parent_symbol: s.parent.clone(),
                comments: Vec::new(),
            })
            .collect()
    }

    /// Returns `true` if `path` has remembered symbols.
    pub async fn contains(&self, path: &str) -> bool {
        self.inner.read().await.contains_key(path)
    }

    pub async fn forget(&self, path: &str) {
        self.inner.write().await.remove(path);
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_unified_diff;
    use crate::symbols::ResolvedCall;
    use std::collections::BTreeSet;

    fn sym(kind: SymbolKind, name: &str, start: u32, end: u32) -> ResolvedSymbol {
        ResolvedSymbol {
            kind,
            name: name.to_string(),
            qualified_name: None,
            start_line: start,
            end_line: end,
        }
    }

    fn changes(added: &[u32], deleted_at: &[u32]) -> LineChangeMap {
        let mut map = LineChangeMap::default();
        for &line in added {
            map.added.insert(line, format!("added {line}"));
            map.changed_lines.insert(line);
        }
        for (i, &line) in deleted_at.iter().enumerate() {
            map.deleted.insert(u32::try_from(i).unwrap(), format!("deleted {i}"));
            map.deleted_positions.push(line);
            map.changed_lines.insert(line);
        }
        map
    }

    fn table(symbols: Vec<ResolvedSymbol>) -> SymbolTable {
        SymbolTable {
            symbols,
            calls: Vec::new(),
        }
    }

    #[test]
    fn mostly_added_symbol_is_added() {
        let f = sym(SymbolKind::Function, "f", 1, 10);
        let change = ChangeClassifier::new().classify(&f, "a.rs", &changes(&[2, 3, 4, 5, 6, 7, 8, 9, 10], &[]), false);

        assert_eq!(change.change_type, ChangeKind::Added);
        assert_eq!(change.change_amount, 9);
    }

    #[test]
    fn half_added_half_deleted_is_modified() {
        let f = sym(SymbolKind::Function, "f", 1, 10);
        let change =
            ChangeClassifier::new().classify(&f, "a.rs", &changes(&[2, 3, 4, 5, 6], &[7, 7, 8, 8, 9]), false);

        assert_eq!(change.change_type, ChangeKind::Modified);
        assert_eq!(change.change_amount, 10);
    }

    #[test]
    fn mostly_deleted_symbol_is_deleted() {
        let f = sym(SymbolKind::Function, "f", 1, 10);
        let change = ChangeClassifier::new().classify(&f, "a.rs", &changes(&[], &[2, 2, 2, 2, 2, 2, 2, 2, 2]), false);

        assert_eq!(change.change_type, ChangeKind::Deleted);
        assert_eq!(change.change_amount, 9);
    }

    #[test]
    fn small_edit_is_modified_with_floor_of_one() {
        let f = sym(SymbolKind::Function, "f", 1, 10);
        let change = ChangeClassifier::new().classify(&f, "a.rs", &changes(&[4], &[]), false);

        assert_eq!(change.change_type, ChangeKind::Modified);
        assert_eq!(change.change_amount, 1);
    }

    #[test]
    fn new_file_is_added_with_span_amount() {
        let f = sym(SymbolKind::Function, "f", 3, 9);
        let change = ChangeClassifier::new().classify(&f, "a.rs", &changes(&[3], &[]), true);

        assert_eq!(change.change_type, ChangeKind::Added);
        assert_eq!(change.change_amount, 6);

        let one_liner = sym(SymbolKind::Constant, "X", 1, 1);
        let change = ChangeClassifier::new().classify(&one_liner, "a.rs", &changes(&[1], &[]), true);
        assert_eq!(change.change_amount, 1);
    }

    #[test]
    fn constant_value_replacement_is_value_changed() {
        let diff = "@@ -1,3 +1,3 @@\n fn a() {}\n-const LIMIT: u32 = 10;\n+const LIMIT: u32 = 20;\n fn b() {}\n";
        let map = parse_unified_diff(diff);
        let constant = sym(SymbolKind::Constant, "LIMIT", 2, 2);

        let change = ChangeClassifier::new().classify(&constant, "a.rs", &map, false);
        assert_eq!(change.change_type, ChangeKind::ValueChanged);
        assert_eq!(change.change_amount, 2);
    }

    #[test]
    fn classify_all_fills_parent_and_skips_container() {
        let symbols = table(vec![
            sym(SymbolKind::Class, "View", 1, 20),
            sym(SymbolKind::Method, "render", 3, 10),
        ]);
        let mut map = changes(&[5], &[]);
        map.added.insert(5, "draw(); // repaint".to_string());

        let out = ChangeClassifier::new().classify_all(&symbols, "v.ts", &map, false, &NoiseFilter::for_path("v.ts"));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol_name, "render");
        assert_eq!(out[0].parent_symbol.as_deref(), Some("View"));
        assert_eq!(out[0].comments, vec!["repaint".to_string()]);
        assert_eq!(out[0].describe(), "method render modified in View");
    }

    #[test]
    fn classify_all_skips_noise_symbols() {
        let symbols = table(vec![
            sym(SymbolKind::Function, "a", 1, 5),
            sym(SymbolKind::Function, "b", 7, 12),
        ]);
        let mut map = changes(&[2, 8], &[]);
        map.added.insert(2, "    // just a note".to_string());
        map.added.insert(8, "    retry();".to_string());

        let out = ChangeClassifier::new().classify_all(&symbols, "a.rs", &map, false, &NoiseFilter::for_path("a.rs"));
        let names: Vec<&str> = out.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn classify_all_deduplicates_by_kind_name_and_line() {
        let symbols = table(vec![
            sym(SymbolKind::Function, "f", 1, 5),
            sym(SymbolKind::Function, "f", 1, 5),
        ]);
        let out = ChangeClassifier::new().classify_all(
            &symbols,
            "a.rs",
            &changes(&[2, 3], &[]),
            false,
            &NoiseFilter::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn call_relations_from_added_lines() {
        let symbols = table(vec![
            sym(SymbolKind::Function, "load", 1, 5),
            sym(SymbolKind::Function, "parse", 7, 10),
            sym(SymbolKind::Function, "untouched", 12, 14),
        ]);
        let mut map = changes(&[3, 8], &[]);
        map.added.insert(3, "    let v = parse(input); untouched(); parse (x);".to_string());
        map.added.insert(8, "    load_more()".to_string());

        let calls = ChangeClassifier::new().call_relations(&symbols, "a.rs", &map);
        assert_eq!(
            calls,
            vec![CallRelation {
                from_symbol: "load".to_string(),
                to_symbol: "parse".to_string(),
                file_path: "a.rs".to_string(),
            }]
        );
    }

    #[test]
    fn call_relations_from_parser_call_sites() {
        let mut symbols = table(vec![
            sym(SymbolKind::Function, "a", 1, 4),
            sym(SymbolKind::Function, "b", 6, 9),
        ]);
        symbols.calls = vec![
            ResolvedCall { callee: "b".to_string(), line: 2 },
            ResolvedCall { callee: "a".to_string(), line: 8 },
        ];
        // Line 2 changed by a deletion inside `a`; line 8 did not change.
        let mut map = changes(&[7], &[2]);
        map.added.insert(7, "    let x = 1;".to_string());

        let calls = ChangeClassifier::new().call_relations(&symbols, "a.rs", &map);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].from_symbol, "a");
        assert_eq!(calls[0].to_symbol, "b");
    }

    #[test]
    fn recursion_is_not_an_edge() {
        let symbols = table(vec![sym(SymbolKind::Function, "fact", 1, 5)]);
        let mut map = changes(&[3], &[]);
        map.added.insert(3, "    n * fact(n - 1)".to_string());

        assert!(ChangeClassifier::new().call_relations(&symbols, "a.rs", &map).is_empty());
    }

    #[tokio::test]
    async fn vanished_symbol_is_reported_deleted() {
        let memory = SymbolMemory::new();
        memory
            .remember(
                "a.rs",
                &table(vec![
                    sym(SymbolKind::Function, "keep", 1, 3),
                    sym(SymbolKind::Function, "gone", 5, 9),
                ]),
            )
            .await;

        let deleted = memory
            .deleted_since("a.rs", &table(vec![sym(SymbolKind::Function, "keep", 1, 3)]))
            .await;

        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].symbol_name, "gone");
        assert_eq!(deleted[0].change_type, ChangeKind::Deleted);
        assert_eq!(deleted[0].change_amount, 5);
    }

    #[tokio::test]
    async fn nested_deletions_fold_into_parent() {
        let memory = SymbolMemory::new();
        memory
            .remember(
                "a.py",
                &table(vec![
                    sym(SymbolKind::Class, "Old", 1, 10),
                    sym(SymbolKind::Method, "run", 2, 5),
                    sym(SymbolKind::Function, "main", 12, 14),
                ]),
            )
            .await;

        let deleted = memory
            .deleted_since("a.py", &table(vec![sym(SymbolKind::Function, "main", 1, 3)]))
            .await;
        let names: BTreeSet<&str> = deleted.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(names, BTreeSet::from(["Old"]));
    }

    #[tokio::test]
    async fn qualified_children_fold_into_deleted_parent() {
        let qualified = |kind, name: &str, qualified: &str, start, end| ResolvedSymbol {
            qualified_name: Some(qualified.to_string()),
            ..sym(kind, name, start, end)
        };
        let memory = SymbolMemory::new();
        memory
            .remember(
                "ui.ts",
                &table(vec![
                    qualified(SymbolKind::Class, "W", "ui.W", 1, 9),
                    qualified(SymbolKind::Method, "draw", "ui.W.draw", 2, 4),
                ]),
            )
            .await;

        let deleted = memory.deleted_since("ui.ts", &SymbolTable::default()).await;
        let names: Vec<&str> = deleted.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(names, vec!["ui.W"]);
    }

    #[tokio::test]
    async fn surviving_parent_is_named_by_qualified_name() {
        let memory = SymbolMemory::new();
        let mut class = sym(SymbolKind::Class, "W", 1, 9);
        class.qualified_name = Some("ui.W".to_string());
        let mut method = sym(SymbolKind::Method, "draw", 2, 4);
        method.qualified_name = Some("ui.W.draw".to_string());
        memory.remember("ui.ts", &table(vec![class.clone(), method])).await;

        let deleted = memory.deleted_since("ui.ts", &table(vec![class])).await;
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].symbol_name, "ui.W.draw");
        assert_eq!(deleted[0].parent_symbol.as_deref(), Some("ui.W"));
    }

    #[test]
    fn classify_all_names_parent_by_qualified_name() {
        let mut class = sym(SymbolKind::Class, "W", 1, 20);
        class.qualified_name = Some("ui.W".to_string());
        let symbols = table(vec![class, sym(SymbolKind::Method, "draw", 3, 10)]);

        let out = ChangeClassifier::new().classify_all(
            &symbols,
            "ui.ts",
            &changes(&[5], &[]),
            false,
            &NoiseFilter::for_path("ui.ts"),
        );
        assert_eq!(out[0].parent_symbol.as_deref(), Some("ui.W"));
    }

    #[tokio::test]
    async fn unknown_file_has_no_deletions() {
        let memory = SymbolMemory::new();
        assert!(memory.deleted_since("x.rs", &SymbolTable::default()).await.is_empty());

        memory.remember("x.rs", &table(vec![sym(SymbolKind::Function, "f", 1, 2)])).await;
        assert!(memory.contains("x.rs").await);
        memory.forget("x.rs").await;
        assert!(!memory.contains("x.rs").await);
    }
}
