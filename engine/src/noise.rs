//! Whitespace and comment churn detection.
//!
//! A change is noise when its added and deleted lines, with comments stripped
//! and whitespace collapsed, read the same. Comment syntax is chosen by file
//! extension through a small [`CommentSyntax`] strategy; unknown extensions
//! strip every common form (`//`, `#`, `/* */`).

use std::path::Path;

/// Comment markers recognised for one family of languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    /// Single-line comment markers.
    pub line: &'static [&'static str],
    /// Block comment delimiters.
    pub block: Option<(&'static str, &'static str)>,
    /// Whether `'` delimits a string literal (false where it marks lifetimes).
    pub single_quote_strings: bool,
}

impl CommentSyntax {
    /// C-family languages.
    pub const C_LIKE: Self = Self {
        line: &["//"],
        block: Some(("/*", "*/")),
        single_quote_strings: true,
    };

    /// Rust: like C, but `'` introduces lifetimes and chars.
    pub const RUST: Self = Self {
        line: &["//"],
        block: Some(("/*", "*/")),
        single_quote_strings: false,
    };

    /// Scripting and config languages using `#`.
    pub const HASH: Self = Self {
        line: &["#"],
        block: None,
        single_quote_strings: true,
    };

    /// Fallback when the extension is unknown.
    pub const GENERIC: Self = Self {
        line: &["//", "#"],
        block: Some(("/*", "*/")),
        single_quote_strings: true,
    };

    /// Picks the syntax for a file path by extension.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("rs") => Self::RUST,
            Some(
                "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "go" | "java" | "kt" | "swift" | "c"
                | "h" | "cc" | "cpp" | "hpp" | "cs" | "scala" | "dart" | "css" | "scss",
            ) => Self::C_LIKE,
            Some("py" | "sh" | "bash" | "zsh" | "rb" | "pl" | "yaml" | "yml" | "toml" | "r") => {
                Self::HASH
            }
            _ => Self::GENERIC,
        }
    }
}

/// Per-file noise detector.
#[derive(Debug, Clone, Copy)]
pub struct NoiseFilter {
    syntax: CommentSyntax,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(CommentSyntax::GENERIC)
    }
}

impl NoiseFilter {
    #[must_use]
    pub fn new(syntax: CommentSyntax) -> Self {
        Self { syntax }
    }

    #[must_use]
    pub fn for_path(path: &str) -> Self {
        Self::new(CommentSyntax::for_path(path))
    }

    /// Returns `true` if the added and deleted sides normalise to the same
    /// text, or both normalise to nothing.
    pub fn is_noise<'a, A, D>(&self, added: A, deleted: D) -> bool
    where
        A: IntoIterator<Item = &'a str>,
        D: IntoIterator<Item = &'a str>,
    {
        let added = self.normalize_all(added);
        let deleted = self.normalize_all(deleted);
        added == deleted
    }

    /// Normalises a sequence of lines and concatenates the results.
    ///
    /// Block comment state carries across lines.
    pub fn normalize_all<'a, I>(&self, lines: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut in_block = false;
        let mut out = String::new();
        for line in lines {
            let code = self.strip_line(line, &mut in_block).code;
            let collapsed = collapse_whitespace(&code);
            if collapsed.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&collapsed);
        }
        out
    }

    /// Normalises one line on its own.
    #[must_use]
    pub fn normalize(&self, line: &str) -> String {
        let mut in_block = false;
        collapse_whitespace(&self.strip_line(line, &mut in_block).code)
    }

    /// Extracts the comment texts found in `lines`, trimmed and non-empty.
    pub fn comments<'a, I>(&self, lines: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut in_block = false;
        let mut out = Vec::new();
        for line in lines {
            for comment in self.strip_line(line, &mut in_block).comments {
                let text = collapse_whitespace(&comment);
                if !text.is_empty() && !out.contains(&text) {
                    out.push(text);
                }
            }
        }
        out
    }

    fn strip_line(&self, line: &str, in_block: &mut bool) -> Stripped {
        let mut code = String::with_capacity(line.len());
        let mut comments = Vec::new();
        let mut quote: Option<char> = None;
        let mut rest = line;

        while !rest.is_empty() {
            if *in_block {
                let Some((_, close)) = self.syntax.block else {
                    *in_block = false;
                    continue;
                };
                match rest.find(close) {
                    Some(idx) => {
                        comments.push(rest[..idx].to_string());
                        rest = &rest[idx + close.len()..];
                        *in_block = false;
                        code.push(' ');
                    }
                    None => {
                        comments.push(rest.to_string());
                        rest = "";
                    }
                }
                continue;
            }

            let Some(c) = rest.chars().next() else { break };

            if let Some(q) = quote {
                code.push(c);
                rest = &rest[c.len_utf8()..];
                if c == '\\' {
                    if let Some(escaped) = rest.chars().next() {
                        code.push(escaped);
                        rest = &rest[escaped.len_utf8()..];
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            if let Some((open, _)) = self.syntax.block {
                if let Some(after) = rest.strip_prefix(open) {
                    *in_block = true;
                    rest = after;
                    continue;
                }
            }

            if let Some(marker) = self.syntax.line.iter().find(|m| rest.starts_with(**m)) {
                comments.push(rest[marker.len()..].to_string());
                break;
            }

            if c == '"' || c == '`' || (c == '\'' && self.syntax.single_quote_strings) {
                quote = Some(c);
            }
            code.push(c);
            rest = &rest[c.len_utf8()..];
        }

        Stripped { code, comments }
    }
}

struct Stripped {
    code: String,
    comments: Vec<String>,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_line_comment_is_noise() {
        let filter = NoiseFilter::for_path("src/lib.rs");
        assert!(filter.is_noise(["    // explain the loop"], []));
    }

    #[test]
    fn reindent_is_noise() {
        let filter = NoiseFilter::for_path("app.ts");
        assert!(filter.is_noise(["        return x;"], ["  return  x;"]));
    }

    #[test]
    fn trailing_comment_change_is_noise() {
        let filter = NoiseFilter::for_path("main.go");
        assert!(filter.is_noise(["x := 1 // new note"], ["x := 1 // old note"]));
    }

    #[test]
    fn real_edit_is_not_noise() {
        let filter = NoiseFilter::for_path("src/lib.rs");
        assert!(!filter.is_noise(["let x = 2;"], ["let x = 1;"]));
        assert!(!filter.is_noise(["call();"], []));
    }

    #[test]
    fn both_sides_empty_is_noise() {
        let filter = NoiseFilter::default();
        assert!(filter.is_noise(Vec::<&str>::new(), Vec::<&str>::new()));
        assert!(filter.is_noise(["", "   "], []));
    }

    #[test]
    fn block_comments_span_lines() {
        let filter = NoiseFilter::for_path("a.c");
        assert!(filter.is_noise(["/* start", " * middle", " end */"], []));
        assert_eq!(filter.normalize_all(["a /* x */ b"]), "a b");
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let filter = NoiseFilter::for_path("a.js");
        assert_eq!(filter.normalize(r#"const url = "http://x"; // c"#), r#"const url = "http://x";"#);
        assert!(!filter.is_noise([r##"s = "# not a comment""##], []));
    }

    #[test]
    fn hash_comments_for_python() {
        let filter = NoiseFilter::for_path("tool.py");
        assert!(filter.is_noise(["x = 1  # why"], ["x = 1"]));
        assert_eq!(filter.normalize("a // b"), "a // b");
    }

    #[test]
    fn rust_does_not_strip_attributes_or_lifetimes() {
        let filter = NoiseFilter::for_path("src/lib.rs");
        assert_eq!(filter.normalize("#[derive(Debug)]"), "#[derive(Debug)]");
        assert_eq!(
            filter.normalize("fn f<'a>(x: &'a str) {} // note"),
            "fn f<'a>(x: &'a str) {}"
        );
    }

    #[test]
    fn generic_strips_all_forms() {
        let filter = NoiseFilter::for_path("notes.unknown");
        assert!(filter.is_noise(["# a", "// b", "/* c */"], []));
    }

    #[test]
    fn comments_are_extracted_and_deduplicated() {
        let filter = NoiseFilter::for_path("a.ts");
        let comments = filter.comments([
            "x(); // retry on failure",
            "/* cache  the result */ y();",
            "z(); // retry on failure",
        ]);
        assert_eq!(comments, vec!["retry on failure", "cache the result"]);
    }

    #[test]
    fn syntax_selection() {
        assert_eq!(CommentSyntax::for_path("a.RS"), CommentSyntax::RUST);
        assert_eq!(CommentSyntax::for_path("a.tsx"), CommentSyntax::C_LIKE);
        assert_eq!(CommentSyntax::for_path("deploy.yaml"), CommentSyntax::HASH);
        assert_eq!(CommentSyntax::for_path("Makefile"), CommentSyntax::GENERIC);
    }
}
