//! Heuristic outline parser.
//!
//! [`OutlineParser`] finds declarations with a few keyword rules and derives
//! their ranges by brace matching, or by indentation for Python. Comments and
//! string literals are blanked out first (byte offsets are preserved) so
//! braces inside them do not count. It is not a real parser: hosts with one
//! plug it in through [`SymbolParser`] instead.
//!
//! Declarations nested inside a function or a variable initializer are not
//! reported.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::noise::CommentSyntax;
use crate::symbols::{ParseOutcome, SymbolParser};
use crate::types::{CallSite, ParsedSymbols, SymbolKind, SymbolRange};

/// Words that may precede a declaration keyword.
const MODIFIERS: &[&str] = &[
    "export", "default", "async", "unsafe", "extern", "public", "private", "protected",
    "internal", "abstract", "override", "final", "open", "sealed", "data", "inline", "virtual",
    "readonly", "declare",
];

/// Identifiers followed by `(` that are not calls.
const NOT_CALLS: &[&str] = &[
    "if", "elif", "else", "for", "while", "loop", "switch", "match", "catch", "return",
    "function", "fn", "func", "fun", "def", "class", "typeof", "sizeof", "await", "yield",
    "assert", "in", "not", "and", "or", "with", "except", "lambda", "super", "when",
];

/// Symbol parser for common languages based on keyword and brace heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineParser;

impl SymbolParser for OutlineParser {
    fn parse_symbols(&self, path: &str, content: &str) -> ParseOutcome {
        let Some(layout) = Layout::for_path(path) else {
            return ParseOutcome::Unsupported;
        };
        if content.contains('\0') {
            return ParseOutcome::Failed("content is not text".to_string());
        }

        let masked = mask(content, CommentSyntax::for_path(path));
        let outline = outline(&masked, layout);
        let calls = call_sites(&masked, &outline.declared);

        ParseOutcome::Parsed(ParsedSymbols {
            symbols: outline.symbols,
            calls,
        })
    }
}

/// How block extents are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Braces,
    Indent,
}

impl Layout {
    fn for_path(path: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)?;
        match ext.as_str() {
            "rs" | "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "go" | "java" | "kt" | "kts"
            | "swift" | "c" | "h" | "cc" | "cpp" | "hpp" | "cs" | "scala" | "dart" | "php" => {
                Some(Self::Braces)
            }
            "py" | "pyi" => Some(Self::Indent),
            _ => None,
        }
    }
}

/// What nested lines of an open declaration may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Members become methods and properties.
    Container,
    /// Nested declarations keep their kind.
    Module,
    /// Nothing nested is reported.
    Opaque,
}

#[derive(Debug)]
struct Open {
    kind: SymbolKind,
    name: String,
    end: usize,
    scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decl {
    Callable {
        name: String,
        offset: usize,
        receiver: Option<String>,
    },
    Type {
        kind: SymbolKind,
        name: String,
        offset: usize,
    },
    Binding {
        name: String,
        offset: usize,
        function: bool,
    },
    Property {
        name: String,
        offset: usize,
    },
}

impl Decl {
    fn name(&self) -> &str {
        match self {
            Self::Callable { name, .. }
            | Self::Type { name, .. }
            | Self::Binding { name, .. }
            | Self::Property { name, .. } => name,
        }
    }

    /// Byte offset of the name within its line.
    fn offset(&self) -> usize {
        match self {
            Self::Callable { offset, .. }
            | Self::Type { offset, .. }
            | Self::Binding { offset, .. }
            | Self::Property { offset, .. } => *offset,
        }
    }
}

struct Placement {
    kind: SymbolKind,
    qualified: Option<String>,
    scope: Scope,
}

#[derive(Debug, Default)]
struct Outline {
    symbols: Vec<SymbolRange>,
    /// Offsets of declared names, excluded from call sites.
    declared: HashSet<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// Exclusive, before the newline.
    end: usize,
}

struct Patterns {
    member: Regex,
    property: Regex,
    assignment: Regex,
    call: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        member: Regex::new(
            r"^\s*(?:[A-Za-z_$][\w$<>\[\],.?*&]*\s+)*([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(",
        )
        .expect("member regex is valid"),
        property: Regex::new(
            r"^\s*(?:(?:pub(?:\([^)]*\))?|public|private|protected|internal|static|readonly|declare|override|export)\s+)*([A-Za-z_$][\w$]*)\s*[?!]?\s*[:=](?:[^:=]|$)",
        )
        .expect("property regex is valid"),
        assignment: Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?::[^=]*)?=(?:[^=]|$)")
            .expect("assignment regex is valid"),
        call: Regex::new(r"\b([A-Za-z_$][\w$]*)\s*\(").expect("call regex is valid"),
    })
}

fn outline(masked: &str, layout: Layout) -> Outline {
    let lines = split_lines(masked);
    let mut out = Outline::default();
    let mut stack: Vec<Open> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        while stack.last().is_some_and(|open| open.end <= line.start) {
            stack.pop();
        }

        let text = &masked[line.start..line.end];
        let indent = text.len() - text.trim_start().len();
        if indent == text.len() {
            continue;
        }

        let enclosing = stack.last();
        let Some(decl) = find_declaration(text, indent, enclosing, layout) else {
            continue;
        };
        let Some(place) = placement(&decl, enclosing) else {
            continue;
        };

        let end = match (&decl, layout) {
            (Decl::Binding { .. } | Decl::Property { .. }, _) => {
                lines[balanced_end_line(masked, &lines, i)].end
            }
            (_, Layout::Braces) => braced_end(masked, &lines, i, line.start + decl.offset()),
            (_, Layout::Indent) => indented_end(masked, &lines, i, indent),
        };

        out.declared.insert(line.start + decl.offset());
        let mut range = SymbolRange::new(place.kind, decl.name(), line.start + indent, end);
        if let Some(qualified) = &place.qualified {
            range = range.with_qualified_name(qualified.clone());
        }
        out.symbols.push(range);

        stack.push(Open {
            kind: place.kind,
            name: place.qualified.unwrap_or_else(|| decl.name().to_string()),
            end,
            scope: place.scope,
        });
    }

    out
}

fn find_declaration(text: &str, indent: usize, enclosing: Option<&Open>, layout: Layout) -> Option<Decl> {
    if let Some(decl) = keyword_declaration(text) {
        return Some(decl);
    }

    let p = patterns();
    match layout {
        Layout::Braces => {
            let container = enclosing
                .filter(|open| open.scope == Scope::Container)
                .map(|open| open.kind)?;

            if let Some(name) = p.member.captures(text).and_then(|c| c.get(1)) {
                if !NOT_CALLS.contains(&name.as_str()) {
                    return Some(Decl::Callable {
                        name: name.as_str().to_string(),
                        offset: name.start(),
                        receiver: None,
                    });
                }
            }

            if matches!(container, SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface) {
                let name = p.property.captures(text).and_then(|c| c.get(1))?;
                return Some(Decl::Property {
                    name: name.as_str().to_string(),
                    offset: name.start(),
                });
            }
            None
        }
        Layout::Indent => {
            let at_body_level = enclosing.map_or(indent == 0, |open| open.scope == Scope::Container);
            if !at_body_level {
                return None;
            }
            let name = p.assignment.captures(text)?.get(1)?;
            let value = text[name.end()..]
                .split_once('=')
                .map_or("", |(_, v)| v.trim_start());
            Some(Decl::Binding {
                name: name.as_str().to_string(),
                offset: name.start(),
                function: value.starts_with("lambda"),
            })
        }
    }
}

/// Recognises `[modifiers] keyword name` at the start of a line.
fn keyword_declaration(line: &str) -> Option<Decl> {
    let mut pos = skip_ws(line, 0);
    loop {
        let (word, end) = ident_at(line, pos)?;
        let after = skip_ws(line, end);
        match word {
            "pub" if line.as_bytes().get(after) == Some(&b'(') => {
                pos = skip_ws(line, close_paren(line, after)? + 1);
            }
            "pub" => pos = after,
            "static" | "const" if !binding_follows(line, after) => pos = after,
            w if MODIFIERS.contains(&w) => pos = after,
            _ => return declaration_after(word, line, after),
        }
    }
}

fn declaration_after(keyword: &str, line: &str, pos: usize) -> Option<Decl> {
    match keyword {
        "fn" | "function" | "func" | "fun" | "def" => {
            let mut pos = pos;
            if line.as_bytes().get(pos) == Some(&b'*') {
                pos = skip_ws(line, pos + 1);
            }
            let mut receiver = None;
            if line.as_bytes().get(pos) == Some(&b'(') {
                let close = close_paren(line, pos)?;
                receiver = last_ident(&line[pos + 1..close]);
                pos = skip_ws(line, close + 1);
            }
            let (name, _) = ident_at(line, pos)?;
            Some(Decl::Callable {
                name: name.to_string(),
                offset: pos,
                receiver,
            })
        }
        "class" | "struct" | "enum" | "trait" | "interface" | "mod" | "module" | "namespace" => {
            let (name, _) = ident_at(line, pos)?;
            let kind = match keyword {
                "class" => SymbolKind::Class,
                "struct" => SymbolKind::Struct,
                "enum" => SymbolKind::Enum,
                "trait" => SymbolKind::Trait,
                "interface" => SymbolKind::Interface,
                _ => SymbolKind::Module,
            };
            Some(Decl::Type {
                kind,
                name: name.to_string(),
                offset: pos,
            })
        }
        "type" => {
            let (name, end) = ident_at(line, pos)?;
            let kind = match ident_at(line, skip_ws(line, end))?.0 {
                "struct" => SymbolKind::Struct,
                "interface" => SymbolKind::Interface,
                _ => return None,
            };
            Some(Decl::Type {
                kind,
                name: name.to_string(),
                offset: pos,
            })
        }
        "impl" => impl_target(line, pos).map(|name| Decl::Type {
            kind: SymbolKind::Impl,
            name,
            offset: pos,
        }),
        "const" | "let" | "var" | "static" | "val" => {
            let mut pos = pos;
            if let Some(("mut", end)) = ident_at(line, pos) {
                pos = skip_ws(line, end);
            }
            let (name, end) = ident_at(line, pos)?;
            let rest = &line[end..];
            let value = rest.split_once('=').map_or("", |(_, v)| v.trim_start());
            let function =
                value.starts_with("function") || value.starts_with("async") || rest.contains("=>");
            Some(Decl::Binding {
                name: name.to_string(),
                offset: pos,
                function,
            })
        }
        _ => None,
    }
}

fn placement(decl: &Decl, enclosing: Option<&Open>) -> Option<Placement> {
    let parent = match enclosing {
        Some(open) if open.scope == Scope::Opaque => return None,
        other => other,
    };
    let in_type = parent.is_some_and(|open| open.scope == Scope::Container);
    let qualify = |name: &str| parent.map(|open| format!("{}.{name}", open.name));

    let place = match decl {
        Decl::Callable {
            name,
            receiver: Some(receiver),
            ..
        } => Placement {
            kind: SymbolKind::Method,
            qualified: Some(format!("{receiver}.{name}")),
            scope: Scope::Opaque,
        },
        Decl::Callable { name, .. } => Placement {
            kind: if in_type { SymbolKind::Method } else { SymbolKind::Function },
            qualified: qualify(name),
            scope: Scope::Opaque,
        },
        Decl::Type { kind, name, .. } => Placement {
            kind: *kind,
            qualified: qualify(name),
            scope: if *kind == SymbolKind::Module {
                Scope::Module
            } else {
                Scope::Container
            },
        },
        Decl::Binding { name, function, .. } => {
            let kind = if *function {
                if in_type { SymbolKind::Method } else { SymbolKind::Function }
            } else if is_constant_name(name) {
                SymbolKind::Constant
            } else if in_type {
                SymbolKind::Property
            } else {
                SymbolKind::Variable
            };
            Placement {
                kind,
                qualified: qualify(name),
                scope: Scope::Opaque,
            }
        }
        Decl::Property { name, .. } => {
            if !in_type {
                return None;
            }
            Placement {
                kind: SymbolKind::Property,
                qualified: qualify(name),
                scope: Scope::Opaque,
            }
        }
    };
    Some(place)
}

/// End offset of a declaration whose body is a brace block, or which ends
/// at a `;`.
///
/// Without either, the declaration ends before the next line that starts
/// another declaration.
fn braced_end(masked: &str, lines: &[Line], line_idx: usize, from: usize) -> usize {
    let bytes = masked.as_bytes();
    let mut depth = 0i32;
    let mut next_line = line_idx + 1;

    for pos in from..bytes.len() {
        match bytes[pos] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b'{' if depth <= 0 => {
                return matching_brace(bytes, pos).map_or(bytes.len(), |close| close + 1);
            }
            b';' if depth <= 0 => return pos + 1,
            b'\n' => {
                if depth <= 0 {
                    let starts_declaration = lines
                        .get(next_line)
                        .is_some_and(|next| keyword_declaration(&masked[next.start..next.end]).is_some());
                    if starts_declaration {
                        return pos;
                    }
                }
                next_line += 1;
            }
            _ => {}
        }
    }
    bytes.len()
}

/// End offset of an indentation block whose header is line `line_idx`.
fn indented_end(masked: &str, lines: &[Line], line_idx: usize, indent: usize) -> usize {
    let header = balanced_end_line(masked, lines, line_idx);
    let mut last = header;
    for (k, line) in lines.iter().enumerate().skip(header + 1) {
        let text = &masked[line.start..line.end];
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if text.len() - trimmed.len() <= indent {
            break;
        }
        last = k;
    }
    lines[last].end
}

/// Index of the first line, from `line_idx` on, at whose end all brackets
/// opened since `line_idx` are closed.
fn balanced_end_line(masked: &str, lines: &[Line], line_idx: usize) -> usize {
    let mut depth = 0i32;
    for (k, line) in lines.iter().enumerate().skip(line_idx) {
        for b in masked[line.start..line.end].bytes() {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                _ => {}
            }
        }
        if depth <= 0 {
            return k;
        }
    }
    lines.len().saturating_sub(1)
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn impl_target(line: &str, pos: usize) -> Option<String> {
    let mut rest = line.get(pos..)?;
    if rest.starts_with('<') {
        let mut depth = 0usize;
        let close = rest.char_indices().find_map(|(i, c)| {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            None
        })?;
        rest = rest[close + 1..].trim_start();
    }

    let header = rest.split(|c| c == '{' || c == ';').next().unwrap_or(rest);
    let header = header.split(" where").next().unwrap_or(header);
    let target = header
        .rsplit(" for ")
        .next()
        .unwrap_or(header)
        .trim()
        .trim_start_matches('&');
    let path: String = target
        .chars()
        .take_while(|&c| is_ident_char(c) || c == ':')
        .collect();
    path.rsplit("::")
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Whether `name` (after an optional `mut`) is followed by `:`, `=`, `;` or
/// the end of the line, as in a binding.
fn binding_follows(line: &str, pos: usize) -> bool {
    let mut pos = pos;
    if let Some(("mut", end)) = ident_at(line, pos) {
        pos = skip_ws(line, end);
    }
    let Some((_, end)) = ident_at(line, pos) else {
        return false;
    };
    let next = skip_ws(line, end);
    matches!(line.as_bytes().get(next), None | Some(b':' | b'=' | b';'))
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase()) && !name.chars().any(|c| c.is_ascii_lowercase())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn ident_at(line: &str, pos: usize) -> Option<(&str, usize)> {
    let rest = line.get(pos..)?;
    let len = rest
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map_or(rest.len(), |(i, _)| i);
    if len == 0 || rest.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    Some((&rest[..len], pos + len))
}

fn last_ident(s: &str) -> Option<String> {
    s.split(|c: char| !is_ident_char(c))
        .filter(|word| !word.is_empty())
        .last()
        .map(str::to_string)
}

fn skip_ws(line: &str, pos: usize) -> usize {
    line.get(pos..)
        .map_or(pos, |rest| pos + (rest.len() - rest.trim_start().len()))
}

fn close_paren(line: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in line.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            lines.push(Line { start, end: i });
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(Line {
            start,
            end: text.len(),
        });
    }
    lines
}

fn call_sites(masked: &str, declared: &HashSet<usize>) -> Vec<CallSite> {
    patterns()
        .call
        .captures_iter(masked)
        .filter_map(|caps| caps.get(1))
        .filter(|name| !declared.contains(&name.start()) && !NOT_CALLS.contains(&name.as_str()))
        .map(|name| CallSite {
            callee: name.as_str().to_string(),
            start_offset: name.start(),
            end_offset: name.end(),
        })
        .collect()
}

/// Replaces comments and string literals with spaces, keeping newlines and
/// byte offsets intact.
fn mask(content: &str, syntax: CommentSyntax) -> String {
    let bytes = content.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        let end = if let Some(len) = block_comment_len(rest, syntax) {
            i + len
        } else if syntax.line.iter().any(|m| rest.starts_with(m.as_bytes())) {
            find(bytes, i, b"\n").unwrap_or(bytes.len())
        } else {
            match bytes[i] {
                quote @ (b'"' | b'`') => string_end(bytes, i, quote, true),
                b'\'' if syntax.single_quote_strings => string_end(bytes, i, b'\'', false),
                b'\'' => char_literal_end(content, i).unwrap_or(i + 1),
                _ => {
                    i += 1;
                    continue;
                }
            }
        };

        for b in &mut out[i..end.min(bytes.len())] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        i = end.max(i + 1);
    }

    String::from_utf8(out).unwrap_or_else(|_| content.to_string())
}

fn block_comment_len(rest: &[u8], syntax: CommentSyntax) -> Option<usize> {
    let (open, close) = syntax.block?;
    if !rest.starts_with(open.as_bytes()) {
        return None;
    }
    Some(find(rest, open.len(), close.as_bytes()).map_or(rest.len(), |p| p + close.len()))
}

fn string_end(bytes: &[u8], start: usize, quote: u8, multiline: bool) -> usize {
    let triple = [quote; 3];
    if bytes[start..].starts_with(&triple) {
        return find(bytes, start + 3, &triple).map_or(bytes.len(), |p| p + 3);
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !multiline => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of a char literal such as `'x'` or `'\n'` starting at `start`;
/// `None` for a lifetime.
fn char_literal_end(content: &str, start: usize) -> Option<usize> {
    let rest = content.get(start + 1..)?;
    let mut chars = rest.char_indices();
    let (_, first) = chars.next()?;
    if first == '\\' {
        let close = rest.get(2..)?.find('\'')?;
        return (close <= 10).then_some(start + 3 + close + 1);
    }
    if first == '\'' {
        return None;
    }
    let (idx, second) = chars.next()?;
    (second == '\'').then_some(start + 1 + idx + 1)
}

fn find(hay: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    hay.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    type Outlined = (Vec<(SymbolKind, String, u32, u32)>, Vec<(String, u32)>);

    fn outline_of(path: &str, content: &str) -> Outlined {
        let ParseOutcome::Parsed(parsed) = OutlineParser.parse_symbols(path, content) else {
            panic!("expected {path} to parse");
        };
        let table = SymbolTable::resolve(&parsed, content);
        (
            table
                .symbols
                .iter()
                .map(|s| (s.kind, s.display_name().to_string(), s.start_line, s.end_line))
                .collect(),
            table.calls.iter().map(|c| (c.callee.clone(), c.line)).collect(),
        )
    }

    fn sym(kind: SymbolKind, name: &str, start: u32, end: u32) -> (SymbolKind, String, u32, u32) {
        (kind, name.to_string(), start, end)
    }

    #[test]
    fn rust_items_and_impl_methods() {
        let src = [
            "const LIMIT: usize = 3;",
            "",
            "pub struct Counter {",
            "    pub count: usize,",
            "}",
            "",
            "impl Counter {",
            "    pub fn bump(&mut self) {",
            "        let c = '{';",
            "        self.count += step(1);",
            "    }",
            "}",
            "",
            "fn step(n: usize) -> usize {",
            "    // } not a brace",
            "    n + LIMIT",
            "}",
            "",
        ]
        .join("\n");

        let (symbols, calls) = outline_of("src/counter.rs", &src);
        assert_eq!(
            symbols,
            vec![
                sym(SymbolKind::Constant, "LIMIT", 1, 1),
                sym(SymbolKind::Struct, "Counter", 3, 5),
                sym(SymbolKind::Property, "Counter.count", 4, 4),
                sym(SymbolKind::Impl, "Counter", 7, 12),
                sym(SymbolKind::Method, "Counter.bump", 8, 11),
                sym(SymbolKind::Function, "step", 14, 17),
            ]
        );
        assert_eq!(calls, vec![("step".to_string(), 10)]);
    }

    #[test]
    fn declarations_without_body_end_at_semicolon() {
        let src = [
            "pub trait Named {",
            "    fn name(&self) -> &str;",
            "}",
            "struct Marker;",
        ]
        .join("\n");

        let (symbols, _) = outline_of("lib.rs", &src);
        assert_eq!(
            symbols,
            vec![
                sym(SymbolKind::Trait, "Named", 1, 3),
                sym(SymbolKind::Method, "Named.name", 2, 2),
                sym(SymbolKind::Struct, "Marker", 4, 4),
            ]
        );
    }

    #[test]
    fn typescript_class_members_and_arrow_functions() {
        let src = [
            "export class Greeter {",
            "  private name: string;",
            "  constructor(name: string) {",
            "    this.name = name;",
            "  }",
            "  greet(): string {",
            "    return format(\"hi {\", this.name);",
            "  }",
            "}",
            "",
            "export const format = (a: string, b: string) => {",
            "  return a + b;",
            "};",
            "let counter = 0;",
        ]
        .join("\n");

        let (symbols, calls) = outline_of("src/greeter.ts", &src);
        assert_eq!(
            symbols,
            vec![
                sym(SymbolKind::Class, "Greeter", 1, 9),
                sym(SymbolKind::Property, "Greeter.name", 2, 2),
                sym(SymbolKind::Method, "Greeter.constructor", 3, 5),
                sym(SymbolKind::Method, "Greeter.greet", 6, 8),
                sym(SymbolKind::Function, "format", 11, 13),
                sym(SymbolKind::Variable, "counter", 14, 14),
            ]
        );
        assert_eq!(calls, vec![("format".to_string(), 7)]);
    }

    #[test]
    fn python_uses_indentation() {
        let src = [
            "import os",
            "",
            "MAX_RETRIES = 3",
            "",
            "class Client:",
            "    \"\"\"Talks to {the} server.\"\"\"",
            "    timeout = 5",
            "",
            "    def fetch(self, url):",
            "        data = load(url)",
            "        return data",
            "",
            "def load(url):",
            "    # read it",
            "    return os.getenv(url)",
            "",
        ]
        .join("\n");

        let (symbols, calls) = outline_of("client.py", &src);
        assert_eq!(
            symbols,
            vec![
                sym(SymbolKind::Constant, "MAX_RETRIES", 3, 3),
                sym(SymbolKind::Class, "Client", 5, 11),
                sym(SymbolKind::Property, "Client.timeout", 7, 7),
                sym(SymbolKind::Method, "Client.fetch", 9, 11),
                sym(SymbolKind::Function, "load", 13, 15),
            ]
        );
        assert_eq!(
            calls,
            vec![("load".to_string(), 10), ("getenv".to_string(), 15)]
        );
    }

    #[test]
    fn go_receivers_become_methods() {
        let src = [
            "package main",
            "",
            "type Server struct {",
            "\taddr string",
            "}",
            "",
            "func (s *Server) Start() error {",
            "\treturn listen(s.addr)",
            "}",
            "",
            "func listen(addr string) error {",
            "\treturn nil",
            "}",
        ]
        .join("\n");

        let (symbols, calls) = outline_of("main.go", &src);
        assert_eq!(
            symbols,
            vec![
                sym(SymbolKind::Struct, "Server", 3, 5),
                sym(SymbolKind::Method, "Server.Start", 7, 9),
                sym(SymbolKind::Function, "listen", 11, 13),
            ]
        );
        assert_eq!(calls, vec![("listen".to_string(), 8)]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        assert_eq!(OutlineParser.parse_symbols("README.md", "# title\n"), ParseOutcome::Unsupported);
        assert_eq!(OutlineParser.parse_symbols("Makefile", "all:\n"), ParseOutcome::Unsupported);
    }

    #[test]
    fn binary_content_fails() {
        assert!(matches!(
            OutlineParser.parse_symbols("blob.rs", "fn a() {}\0\0"),
            ParseOutcome::Failed(_)
        ));
    }

    #[test]
    fn mask_blanks_strings_and_comments() {
        let masked = mask("a = \"{\" // {\nb", CommentSyntax::C_LIKE);
        assert_eq!(masked, format!("a = {}\nb", " ".repeat(8)));

        let source = "fn f<'a>(c: char) -> bool { c == '}' }";
        let masked = mask(source, CommentSyntax::RUST);
        assert_eq!(masked.matches('}').count(), 1, "char literal brace is blanked");
        assert_eq!(masked.len(), source.len());
    }

    #[test]
    fn keyword_declaration_skips_modifiers() {
        assert_eq!(
            keyword_declaration("pub(crate) async fn load() {}").map(|d| d.name().to_string()),
            Some("load".to_string())
        );
        assert_eq!(
            keyword_declaration("pub const fn make() -> u8 { 1 }").map(|d| d.name().to_string()),
            Some("make".to_string())
        );
        assert!(matches!(
            keyword_declaration("static COUNT: AtomicUsize = AtomicUsize::new(0);"),
            Some(Decl::Binding { .. })
        ));
        assert_eq!(keyword_declaration("return value;"), None);
    }

    #[test]
    fn impl_target_names_the_self_type() {
        assert_eq!(impl_target("impl<T: Clone> fmt::Display for Wrapper<T> {", 5).as_deref(), Some("Wrapper"));
        assert_eq!(impl_target("impl Counter {", 5).as_deref(), Some("Counter"));
    }
}
