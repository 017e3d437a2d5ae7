//! Data types shared across the change-detection pipeline.
//!
//! This module defines the event schema handed to the presentation layer,
//! along with the symbol table types consumed from the external parser. All
//! emitted types serialize to camelCase JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of file-system notification delivered by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Add,
    Change,
    Unlink,
}

/// A single watcher notification for a path relative to the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path relative to the watched root, using `/` separators.
    pub path: String,
    /// What happened to the file.
    pub kind: FileEventKind,
}

impl FileEvent {
    /// Creates a new file event.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// How a symbol was affected by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    ValueChanged,
}

impl ChangeKind {
    /// Returns the past-tense verb used in descriptions.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::ValueChanged => "value changed",
        }
    }
}

/// Kind of a symbol reported by the symbol parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Impl,
    Module,
    Variable,
    Constant,
    Property,
    Other,
}

impl SymbolKind {
    /// Returns true for class-like symbols that contain other symbols.
    ///
    /// Container symbols are only reported as changed when an edited line
    /// falls outside all of their nested symbols.
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Class
                | Self::Struct
                | Self::Enum
                | Self::Interface
                | Self::Trait
                | Self::Impl
                | Self::Module
        )
    }

    /// Returns true for functions and methods.
    #[must_use]
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    /// Returns true for symbols that hold a value rather than code.
    #[must_use]
    pub fn is_value(self) -> bool {
        matches!(self, Self::Variable | Self::Constant | Self::Property)
    }

    /// Returns the lowercase name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Property => "property",
            Self::Other => "symbol",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbol declared in a file, as reported by the symbol parser.
///
/// Offsets are byte offsets into the file content; `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRange {
    pub kind: SymbolKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl SymbolRange {
    /// Creates an unqualified symbol range.
    #[must_use]
    pub fn new(kind: SymbolKind, name: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        Self {
            kind,
            name: name.into(),
            qualified_name: None,
            start_offset,
            end_offset,
        }
    }

    /// Sets the qualified name.
    #[must_use]
    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }
}

/// A call expression found by the symbol parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    pub callee: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Full output of a successful symbol parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSymbols {
    pub symbols: Vec<SymbolRange>,
    pub calls: Vec<CallSite>,
}

/// A change tied to the most specific symbol containing the edited lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedChange {
    pub symbol_kind: SymbolKind,
    pub symbol_name: String,
    pub change_type: ChangeKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Number of changed lines inside `[start_line, end_line]`, at least 1.
    pub change_amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_symbol: Option<String>,
    /// Comment texts found on the added lines of this symbol.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

impl AttributedChange {
    /// Returns a one-line human readable description.
    ///
    /// ```
    /// use deltascope_engine::types::{AttributedChange, ChangeKind, SymbolKind};
    ///
    /// let change = AttributedChange {
    ///     symbol_kind: SymbolKind::Method,
    ///     symbol_name: "render".to_string(),
    ///     change_type: ChangeKind::Added,
    ///     file_path: "src/view.ts".to_string(),
    ///     start_line: 4,
    ///     end_line: 9,
    ///     change_amount: 5,
    ///     parent_symbol: Some("View".to_string()),
    ///     comments: Vec::new(),
    /// };
    /// assert_eq!(change.describe(), "method render added to View");
    /// ```
    #[must_use]
    pub fn describe(&self) -> String {
        let base = format!(
            "{} {} {}",
            self.symbol_kind,
            self.symbol_name,
            self.change_type.verb()
        );
        match (&self.parent_symbol, self.change_type) {
            (Some(parent), ChangeKind::Added) => format!("{base} to {parent}"),
            (Some(parent), ChangeKind::Deleted) => format!("{base} from {parent}"),
            (Some(parent), _) => format!("{base} in {parent}"),
            (None, _) => base,
        }
    }
}

/// A call edge between two symbols touched by the same diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRelation {
    pub from_symbol: String,
    pub to_symbol: String,
    pub file_path: String,
}

/// Fixed vocabulary used to summarize a diff.
///
/// Variant order is the tie-break order when picking a primary category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeCategory {
    FunctionAdded,
    FunctionDeleted,
    LogicAdded,
    LogicChanged,
    CodeDeleted,
    ApiCall,
    ApiExposure,
    ExternalRead,
}

impl ChangeCategory {
    /// All categories in tie-break order.
    pub const ALL: [ChangeCategory; 8] = [
        Self::FunctionAdded,
        Self::FunctionDeleted,
        Self::LogicAdded,
        Self::LogicChanged,
        Self::CodeDeleted,
        Self::ApiCall,
        Self::ApiExposure,
        Self::ExternalRead,
    ];

    /// Returns the display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FunctionAdded => "function added",
            Self::FunctionDeleted => "function deleted",
            Self::LogicAdded => "logic added",
            Self::LogicChanged => "logic changed",
            Self::CodeDeleted => "code deleted",
            Self::ApiCall => "API call",
            Self::ApiExposure => "API exposure",
            Self::ExternalRead => "external read",
        }
    }
}

/// One consolidated summary for all attributed changes of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub primary: ChangeCategory,
    /// Non-zero category counts, in category order.
    pub counts: Vec<(ChangeCategory, u32)>,
    pub summary: String,
    pub first_line: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

/// The unit emitted downstream for each reported diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: Uuid,
    pub file_path: String,
    pub attributed_changes: Vec<AttributedChange>,
    pub call_relations: Vec<CallRelation>,
    pub timestamp: DateTime<Utc>,
    pub is_new_file: bool,
    pub raw_diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ChangeSummary>,
}

impl ChangeEvent {
    /// Creates an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        attributed_changes: Vec<AttributedChange>,
        call_relations: Vec<CallRelation>,
        is_new_file: bool,
        raw_diff: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: file_path.into(),
            attributed_changes,
            call_relations,
            timestamp: Utc::now(),
            is_new_file,
            raw_diff: raw_diff.into(),
            summary: None,
        }
    }
}

/// Everything the engine publishes on its output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A diff was attributed and reported.
    Change(ChangeEvent),
    /// A previously tracked file was deleted and all its state discarded.
    FileForgotten { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_change(kind: ChangeKind, parent: Option<&str>) -> AttributedChange {
        AttributedChange {
            symbol_kind: SymbolKind::Function,
            symbol_name: "load".to_string(),
            change_type: kind,
            file_path: "src/lib.rs".to_string(),
            start_line: 3,
            end_line: 8,
            change_amount: 2,
            parent_symbol: parent.map(str::to_string),
            comments: Vec::new(),
        }
    }

    #[test]
    fn change_kind_serializes_to_camel_case() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::ValueChanged).unwrap(),
            "\"valueChanged\""
        );
        assert_eq!(serde_json::to_string(&ChangeKind::Added).unwrap(), "\"added\"");
    }

    #[test]
    fn file_event_kind_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&FileEventKind::Unlink).unwrap(),
            "\"unlink\""
        );
    }

    #[test]
    fn container_kinds() {
        assert!(SymbolKind::Class.is_container());
        assert!(SymbolKind::Impl.is_container());
        assert!(!SymbolKind::Method.is_container());
        assert!(!SymbolKind::Variable.is_container());
    }

    #[test]
    fn describe_uses_parent_preposition() {
        assert_eq!(
            sample_change(ChangeKind::Added, Some("Loader")).describe(),
            "function load added to Loader"
        );
        assert_eq!(
            sample_change(ChangeKind::Deleted, Some("Loader")).describe(),
            "function load deleted from Loader"
        );
        assert_eq!(
            sample_change(ChangeKind::Modified, Some("Loader")).describe(),
            "function load modified in Loader"
        );
        assert_eq!(
            sample_change(ChangeKind::Modified, None).describe(),
            "function load modified"
        );
    }

    #[test]
    fn attributed_change_omits_empty_optional_fields() {
        let json = serde_json::to_value(sample_change(ChangeKind::Modified, None)).unwrap();
        assert!(json.get("parentSymbol").is_none());
        assert!(json.get("comments").is_none());
        assert_eq!(json["symbolKind"], "function");
        assert_eq!(json["changeType"], "modified");
        assert_eq!(json["changeAmount"], 2);
    }

    #[test]
    fn engine_event_is_internally_tagged() {
        let event = EngineEvent::FileForgotten {
            path: "a.rs".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "file_forgotten");
        assert_eq!(json["path"], "a.rs");
    }

    #[test]
    fn change_event_new_sets_identity() {
        let a = ChangeEvent::new("a.rs", Vec::new(), Vec::new(), false, "");
        let b = ChangeEvent::new("a.rs", Vec::new(), Vec::new(), false, "");
        assert_ne!(a.id, b.id);
        assert!(a.summary.is_none());
    }
}
