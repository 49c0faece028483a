//! Language-aware structural decomposition of source text into [`CodeChunk`]s.
//!
//! This is best-effort pattern extraction, not a grammar-correct parse.
//! Extraction rules within a language are independent and may overlap: a
//! class chunk and the function chunks inside it are all emitted, each
//! covering its own span.
//!
//! # Languages
//!
//! | Family | Extracted |
//! |--------|-----------|
//! | Curly-brace (Kotlin, Java, Rust, Swift, …) | classes/interfaces/enums, objects, functions, top-level bindings |
//! | ECMAScript | classes, functions, function-valued bindings, object-literal bindings |
//! | Python | `class` and `def` blocks with their indented bodies |
//! | Markup | `<tag attrs>…</tag>` elements with attributes as properties |
//! | Stylesheet | `selector { prop: value; }` rules |
//! | Structured data | flat string-valued `"key": "value"` pairs |
//! | Generic | one synthetic chunk holding `key: value` / `key = value` lines |
//!
//! # Brace matching
//!
//! Bodies are matched by counting brace depth while skipping string
//! literals and comments, so nested bodies are captured whole. An
//! unbalanced body extends to the end of the text.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ChunkKind, CodeChunk};

const MODIFIERS: &str = r"(?:(?:public|private|protected|internal|static|export|default|async|override|open|suspend|inline|abstract|data|sealed|final|lateinit|tailrec|operator|infix|external|pub(?:\([^)]*\))?)\s+)*";

/// Source language family used to pick extraction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    CurlyBrace,
    EcmaScript,
    Python,
    Markup,
    Stylesheet,
    StructuredData,
    Generic,
}

impl Language {
    /// Resolve a caller-supplied hint: a language name or a file extension.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().trim_start_matches('.').to_lowercase();
        let language = match hint.as_str() {
            "kotlin" | "kt" | "kts" | "java" | "swift" | "rust" | "rs" | "go" | "c" | "cpp"
            | "c++" | "h" | "hpp" | "cs" | "csharp" | "dart" | "scala" => Language::CurlyBrace,
            "javascript" | "js" | "mjs" | "cjs" | "jsx" | "typescript" | "ts" | "tsx" => {
                Language::EcmaScript
            }
            "python" | "py" | "pyw" => Language::Python,
            "html" | "htm" | "xml" | "svg" | "xhtml" | "markup" => Language::Markup,
            "css" | "scss" | "less" | "stylesheet" => Language::Stylesheet,
            "json" | "jsonc" | "structured" => Language::StructuredData,
            "text" | "txt" | "generic" | "properties" | "ini" | "yaml" | "yml" | "toml" => {
                Language::Generic
            }
            _ => return None,
        };
        Some(language)
    }

    /// Infer the language family from keyword sniffing.
    pub fn detect(text: &str) -> Self {
        static KOTLIN_FUN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(&format!(r"(?m)^[ \t]*{MODIFIERS}fun\s+\w+"))
                .expect("valid kotlin fun regex")
        });
        static CLASS_WORD: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\bclass\s+\w+").expect("valid class word regex"));
        static JAVA_MEMBER: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^[ \t]*(?:public|private|protected)\s+(?:static\s+)?(?:final\s+)?(?:class|interface|enum|void|[\w<>\[\]]+\s+\w+\s*\()")
                .expect("valid java member regex")
        });
        static ECMA_BINDING: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)\bfunction\b|^[ \t]*(?:export\s+)?(?:const|let|var)\s+\w+\s*=|=>")
                .expect("valid ecmascript regex")
        });
        static PYTHON_MARKER: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^[ \t]*(?:async\s+)?def\s+\w+\s*\(|^[ \t]*import\s+\w+|^[ \t]*from\s+[\w.]+\s+import\s|^[ \t]*class\s+\w+\s*(?:\([^)\n]*\))?\s*:[ \t]*$")
                .expect("valid python regex")
        });
        static BRACED_CLASS: Lazy<Regex> = Lazy::new(|| {
            Regex::new(&format!(r"(?m)^[ \t]*{MODIFIERS}(?:class|interface|enum\s+class|enum|object)\s+\w+[^\n{{;]*\{{"))
                .expect("valid braced class regex")
        });
        static TAG: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"<[A-Za-z][\w:.-]*(?:\s[^<>]*)?/?>").expect("valid tag regex")
        });

        if KOTLIN_FUN.is_match(text)
            || (CLASS_WORD.is_match(text) && text.contains(':') && text.contains('{'))
            || JAVA_MEMBER.is_match(text)
        {
            Language::CurlyBrace
        } else if ECMA_BINDING.is_match(text) {
            Language::EcmaScript
        } else if PYTHON_MARKER.is_match(text) {
            Language::Python
        } else if BRACED_CLASS.is_match(text) {
            Language::CurlyBrace
        } else if TAG.is_match(text) {
            Language::Markup
        } else if text.contains('{')
            && text.contains(':')
            && text.contains(';')
            && !text.contains("function")
        {
            Language::Stylesheet
        } else if text.trim_start().starts_with('{') || text.trim_start().starts_with('[') {
            Language::StructuredData
        } else {
            Language::Generic
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::CurlyBrace => "curly_brace",
            Language::EcmaScript => "ecmascript",
            Language::Python => "python",
            Language::Markup => "markup",
            Language::Stylesheet => "stylesheet",
            Language::StructuredData => "structured_data",
            Language::Generic => "generic",
        }
    }
}

/// Resolve the language from an optional hint, falling back to sniffing.
pub fn resolve_language(text: &str, language_hint: Option<&str>) -> Language {
    language_hint
        .and_then(Language::from_hint)
        .unwrap_or_else(|| Language::detect(text))
}

/// Decompose `text` into chunks ordered by their position in the source.
///
/// Returns an empty vector when nothing matches.
pub fn parse_to_chunks(text: &str, language_hint: Option<&str>) -> Vec<CodeChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut out = ChunkSink::default();
    match resolve_language(text, language_hint) {
        Language::CurlyBrace => parse_curly(text, &mut out),
        Language::EcmaScript => parse_ecmascript(text, &mut out),
        Language::Python => parse_python(text, &mut out),
        Language::Markup => parse_markup(text, &mut out),
        Language::Stylesheet => parse_stylesheet(text, &mut out),
        Language::StructuredData => parse_structured(text, &mut out),
        Language::Generic => parse_generic(text, &mut out),
    }
    out.finish()
}

/// Collects chunks with their start offset and drops exact duplicates
/// produced by overlapping rules.
#[derive(Default)]
struct ChunkSink {
    chunks: Vec<(usize, CodeChunk)>,
    seen: HashSet<(ChunkKind, String, usize)>,
}

impl ChunkSink {
    fn push(&mut self, start: usize, chunk: CodeChunk) {
        if self.seen.insert((chunk.kind, chunk.name.clone(), start)) {
            self.chunks.push((start, chunk));
        }
    }

    fn finish(mut self) -> Vec<CodeChunk> {
        self.chunks.sort_by_key(|(start, _)| *start);
        self.chunks.into_iter().map(|(_, c)| c).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Brace scanning
// ═══════════════════════════════════════════════════════════════════════

/// Index just past the string literal opening at `start`.
///
/// Single- and double-quoted strings end at an unescaped quote or at the
/// end of the line; template strings may span lines.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if quote != b'`' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index of the first byte after a comment starting at `start`, if any.
fn skip_comment(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes[start] != b'/' {
        return None;
    }
    match bytes.get(start + 1) {
        Some(b'/') => Some(
            bytes[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| start + p),
        ),
        Some(b'*') => Some(
            bytes[start + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| start + 2 + p + 2),
        ),
        _ => None,
    }
}

/// Find the `}` matching the `{` at `open`.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(next) = skip_comment(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Span `(open, end)` of a brace block, where `end` is one past the
/// closing brace (or the end of text when unbalanced).
fn block_span(text: &str, open: usize) -> (usize, usize) {
    match matching_brace(text, open) {
        Some(close) => (open, close + 1),
        None => (open, text.len()),
    }
}

/// Interior of a block span, without the outer braces.
fn block_inner(text: &str, (open, end): (usize, usize)) -> &str {
    let inner_end = if text[..end].ends_with('}') { end - 1 } else { end };
    &text[(open + 1).min(inner_end)..inner_end]
}

/// Offset of the next non-whitespace byte at or after `from`.
fn next_non_ws(text: &str, from: usize) -> Option<usize> {
    text[from..]
        .find(|c: char| !c.is_whitespace())
        .map(|p| from + p)
}

/// Lines of `text` whose start lies at brace depth zero.
fn top_level_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut line_start = 0usize;
    let mut line_depth = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if let Some(next) = skip_comment(bytes, i) {
            // Block comments may swallow newlines; line comments stop before one.
            i = next;
            continue;
        }
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'\n' => {
                if line_depth == 0 {
                    lines.push(&text[line_start..i]);
                }
                line_start = i + 1;
                line_depth = depth;
            }
            _ => {}
        }
        i += 1;
    }
    if line_start < text.len() && line_depth == 0 {
        lines.push(&text[line_start..]);
    }
    lines
}

/// End offset of a function signature beginning at `from`: one past the
/// parameter list's closing parenthesis, or `from` when there is none.
fn signature_end(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let Some(open) = text[from..].find('(').map(|p| from + p) else {
        return from;
    };
    if text[from..open].contains('\n') {
        return from;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Span of a function starting at `start` whose signature ends at `sig_end`.
///
/// A `{` body is brace-matched; an `=` expression body or a bare
/// declaration runs to the end of the line.
fn function_span(text: &str, start: usize, sig_end: usize) -> (usize, Option<(usize, usize)>) {
    let rest = &text[sig_end..];
    let line_end = rest.find('\n').map_or(text.len(), |p| sig_end + p);
    let on_line = &text[sig_end..line_end];

    if let Some(p) = on_line.find(['{', '=', ';']) {
        let at = sig_end + p;
        return match text.as_bytes()[at] {
            b'{' => {
                let span = block_span(text, at);
                (span.1, Some(span))
            }
            _ => (line_end, None),
        };
    }
    // Brace on the following line.
    match next_non_ws(text, line_end) {
        Some(p) if text.as_bytes()[p] == b'{' => {
            let span = block_span(text, p);
            (span.1, Some(span))
        }
        _ => (line_end.max(start), None),
    }
}

/// Span of a type declaration whose header starts at `start` and whose
/// name ends at `name_end`: the header line plus an optional brace body.
fn declaration_span(text: &str, name_end: usize) -> (usize, Option<(usize, usize)>) {
    // Skip a primary-constructor parameter list, which may span lines.
    let mut cursor = name_end;
    if let Some(p) = next_non_ws(text, cursor) {
        if text.as_bytes()[p] == b'(' {
            cursor = signature_end(text, p);
        }
    }
    let rest = &text[cursor..];
    let stop = rest.find(['{', ';', '\n']).map(|p| cursor + p);
    match stop {
        Some(p) if text.as_bytes()[p] == b'{' => {
            let span = block_span(text, p);
            (span.1, Some(span))
        }
        Some(p) if text.as_bytes()[p] == b'\n' => match next_non_ws(text, p) {
            Some(q) if text.as_bytes()[q] == b'{' => {
                let span = block_span(text, q);
                (span.1, Some(span))
            }
            _ => (p, None),
        },
        Some(p) => (p + 1, None),
        None => (text.len(), None),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Property extraction
// ═══════════════════════════════════════════════════════════════════════

static BINDING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^[ \t]*{MODIFIERS}(?:const\s+val|val|var|let|const)\s+(?:mut\s+)?([A-Za-z_$][\w$]*)\s*(?::\s*([^=;]+?))?\s*(?:=\s*(.+?))?\s*;?\s*$"
    ))
    .expect("valid binding regex")
});

/// Scan a body for `keyword identifier (':'|'=') value` statements at its
/// top level. Values are trimmed raw text; a type annotation stands in for
/// the value when there is no initializer.
pub fn extract_properties(body: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for line in top_level_lines(body) {
        if let Some(caps) = BINDING_LINE.captures(line) {
            let value = caps
                .get(3)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().trim().to_string());
            if let Some(value) = value {
                props.insert(caps[1].to_string(), value);
            }
        }
    }
    props
}

/// Split `text` at top-level `,` and newlines, respecting nesting and strings.
fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if let Some(next) = skip_comment(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth -= 1,
            b',' | b'\n' if depth <= 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with("//"))
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\'', '`'] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

/// Parse the interior of an object literal into flat key/value pairs.
/// Surrounding quotes are stripped from keys and values.
pub fn parse_object_literal(inner: &str) -> BTreeMap<String, String> {
    static KEY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"^(?:"[^"]+"|'[^']+'|[A-Za-z_$][\w$-]*)$"#).expect("valid key regex")
    });

    let mut props = BTreeMap::new();
    for entry in split_top_level(inner) {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if !KEY.is_match(key) {
            continue;
        }
        props.insert(strip_quotes(key).to_string(), strip_quotes(value).to_string());
    }
    props
}

// ═══════════════════════════════════════════════════════════════════════
// Curly-brace languages
// ═══════════════════════════════════════════════════════════════════════

fn parse_curly(text: &str, out: &mut ChunkSink) {
    static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(
            r"(?m)^[ \t]*{MODIFIERS}(?:(enum\s+class|annotation\s+class|class|interface|enum|struct|trait|record)|(object))\s+(\w+)"
        ))
        .expect("valid type declaration regex")
    });
    static FUN_DECL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(
            r"(?m)^[ \t]*{MODIFIERS}(?:fun|fn|func)\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(\w+)\s*[(<]"
        ))
        .expect("valid function declaration regex")
    });
    static JAVA_METHOD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:(?:public|private|protected|static|final|synchronized|abstract|native)\s+)+[\w<>\[\],.? ]+?\s+(\w+)\s*\(")
            .expect("valid java method regex")
    });

    for caps in TYPE_DECL.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let name = &caps[3];
        let kind = if caps.get(2).is_some() {
            ChunkKind::Object
        } else {
            ChunkKind::Class
        };
        let (end, body) = declaration_span(text, whole.end);
        let start = line_start(text, whole.start);
        let props = body
            .map(|span| extract_properties(block_inner(text, span)))
            .unwrap_or_default();
        out.push(
            start,
            CodeChunk::new(kind, name, text[start..end].trim()).with_properties(props),
        );
    }

    for re in [&*FUN_DECL, &*JAVA_METHOD] {
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let name = &caps[1];
            if matches!(name, "if" | "for" | "while" | "switch" | "catch" | "return") {
                continue;
            }
            let start = line_start(text, whole.start);
            let sig_end = signature_end(text, whole.end.saturating_sub(1));
            let (end, body) = function_span(text, start, sig_end);
            let props = body
                .map(|span| extract_properties(block_inner(text, span)))
                .unwrap_or_default();
            out.push(
                start,
                CodeChunk::new(ChunkKind::Function, name, text[start..end].trim())
                    .with_properties(props),
            );
        }
    }

    push_top_level_bindings(text, out);
}

/// Emit zero-body `Variable` chunks for bindings declared at depth zero.
fn push_top_level_bindings(text: &str, out: &mut ChunkSink) {
    for line in top_level_lines(text) {
        let Some(caps) = BINDING_LINE.captures(line) else {
            continue;
        };
        let mut props = BTreeMap::new();
        if let Some(ty) = caps.get(2) {
            props.insert("type".to_string(), ty.as_str().trim().to_string());
        }
        if let Some(value) = caps.get(3) {
            props.insert("value".to_string(), value.as_str().trim().to_string());
        }
        let start = line.as_ptr() as usize - text.as_ptr() as usize;
        out.push(
            start,
            CodeChunk::new(ChunkKind::Variable, &caps[1], line.trim()).with_properties(props),
        );
    }
}

fn line_start(text: &str, at: usize) -> usize {
    let at = next_non_ws(text, at).unwrap_or(at);
    text[..at].rfind('\n').map_or(0, |p| p + 1)
}

// ═══════════════════════════════════════════════════════════════════════
// ECMAScript
// ═══════════════════════════════════════════════════════════════════════

fn parse_ecmascript(text: &str, out: &mut ChunkSink) {
    static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)")
            .expect("valid js class regex")
    });
    static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*\(")
            .expect("valid js function regex")
    });
    static FUNCTION_BINDING: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b[^(]*\([^)]*\)|\([^)]*\)|\w+)\s*(?:=>)?\s*(?::\s*[\w<>\[\]]+\s*)?")
            .expect("valid js function binding regex")
    });
    static OBJECT_BINDING: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*(?::\s*[\w<>\[\]]+\s*)?=\s*\{")
            .expect("valid js object binding regex")
    });
    static CLASS_FIELD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[ \t]*(?:static\s+)?(#?[A-Za-z_$][\w$]*)\s*=\s*(.+?);?\s*$")
            .expect("valid class field regex")
    });

    for caps in CLASS_DECL.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let (end, body) = declaration_span(text, whole.end);
        let start = line_start(text, whole.start);
        let mut props = BTreeMap::new();
        if let Some(span) = body {
            let inner = block_inner(text, span);
            props = extract_properties(inner);
            for line in top_level_lines(inner) {
                if let Some(field) = CLASS_FIELD.captures(line) {
                    props.insert(field[1].to_string(), field[2].trim().to_string());
                }
            }
        }
        out.push(
            start,
            CodeChunk::new(ChunkKind::Class, &caps[1], text[start..end].trim())
                .with_properties(props),
        );
    }

    for caps in FUNCTION_DECL.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let start = line_start(text, whole.start);
        let sig_end = signature_end(text, whole.end - 1);
        let (end, body) = function_span(text, start, sig_end);
        let props = body
            .map(|span| extract_properties(block_inner(text, span)))
            .unwrap_or_default();
        out.push(
            start,
            CodeChunk::new(ChunkKind::Function, &caps[1], text[start..end].trim())
                .with_properties(props),
        );
    }

    for caps in FUNCTION_BINDING.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let matched = caps.get(0).map_or("", |m| m.as_str());
        if !matched.contains("=>") && !matched.contains("function") {
            continue;
        }
        let Some(open) = next_non_ws(text, whole.end) else {
            continue;
        };
        if text.as_bytes()[open] != b'{' {
            continue;
        }
        let span = block_span(text, open);
        let start = line_start(text, whole.start);
        out.push(
            start,
            CodeChunk::new(ChunkKind::Function, &caps[1], text[start..span.1].trim())
                .with_properties(extract_properties(block_inner(text, span))),
        );
    }

    for caps in OBJECT_BINDING.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let open = whole.end - 1;
        let span = block_span(text, open);
        let start = line_start(text, whole.start);
        out.push(
            start,
            CodeChunk::new(ChunkKind::Object, &caps[1], text[start..span.1].trim())
                .with_properties(parse_object_literal(block_inner(text, span))),
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Python
// ═══════════════════════════════════════════════════════════════════════

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn parse_python(text: &str, out: &mut ChunkSink) {
    static HEADER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^([ \t]*)(?:(class)\s+(\w+)|(?:async\s+)?def\s+(\w+)\s*\()")
            .expect("valid python header regex")
    });
    static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:self\.)?([A-Za-z_]\w*)\s*(?::\s*[^=]+?)?\s*=\s*(.+?)\s*$")
            .expect("valid python assignment regex")
    });
    static ONE_LINER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:\)\s*(?:->\s*[^:]+)?|class\s+\w+(?:\([^)]*\))?\s*):\s*[^\s#]")
            .expect("valid python one-liner regex")
    });

    let lines: Vec<&str> = text.lines().collect();
    let offsets: Vec<usize> = lines
        .iter()
        .map(|l| l.as_ptr() as usize - text.as_ptr() as usize)
        .collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = HEADER.captures(line) else {
            continue;
        };
        let header_indent = caps[1].len();

        // Signatures may continue over several lines until the colon.
        let mut header_end = i;
        if !ONE_LINER.is_match(line) {
            while header_end < lines.len() && !lines[header_end].trim_end().ends_with(':') {
                header_end += 1;
            }
            if header_end == lines.len() {
                continue;
            }
        }

        let mut body_end = header_end + 1;
        while body_end < lines.len() {
            let l = lines[body_end];
            if !l.trim().is_empty() && indent_of(l) <= header_indent {
                break;
            }
            body_end += 1;
        }
        while body_end > header_end + 1 && lines[body_end - 1].trim().is_empty() {
            body_end -= 1;
        }

        let body = &lines[header_end + 1..body_end];
        let content = lines[i..body_end].join("\n");
        let (kind, name) = match (caps.get(2), caps.get(3), caps.get(4)) {
            (Some(_), Some(n), _) => (ChunkKind::Class, n.as_str()),
            (_, _, Some(n)) => (ChunkKind::Function, n.as_str()),
            _ => continue,
        };

        let mut props = BTreeMap::new();
        let body_indent = body
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| indent_of(l))
            .min();
        for l in body {
            let trimmed = l.trim();
            let at_body_level = Some(indent_of(l)) == body_indent;
            let is_self_attr = trimmed.starts_with("self.");
            if kind == ChunkKind::Class && (at_body_level || is_self_attr) {
                if let Some(a) = ASSIGNMENT.captures(trimmed) {
                    props.insert(a[1].to_string(), a[2].to_string());
                }
            } else if kind == ChunkKind::Function && at_body_level && !is_self_attr {
                if let Some(a) = ASSIGNMENT.captures(trimmed) {
                    props.insert(a[1].to_string(), a[2].to_string());
                }
            }
        }

        out.push(offsets[i], CodeChunk::new(kind, name, content).with_properties(props));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Markup, stylesheets, structured data, generic
// ═══════════════════════════════════════════════════════════════════════

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

fn parse_markup(text: &str, out: &mut ChunkSink) {
    static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"<([A-Za-z][\w:.-]*)((?:\s[^<>]*?)?)(/?)>").expect("valid open tag regex")
    });

    for caps in OPEN_TAG.captures_iter(text) {
        if !caps[3].is_empty() {
            continue;
        }
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let tag = &caps[1];
        let closing = format!("</{}>", tag);
        let Some(close_at) = text[whole.end..].find(&closing).map(|p| whole.end + p) else {
            continue;
        };
        let end = close_at + closing.len();

        let mut props = BTreeMap::new();
        for attr in ATTRIBUTE.captures_iter(&caps[2]) {
            let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
            props.insert(attr[1].to_string(), value.to_string());
        }
        let inner = text[whole.end..close_at].trim();
        if !inner.is_empty() && !inner.contains('<') {
            props.insert("text".to_string(), inner.to_string());
        }

        out.push(
            whole.start,
            CodeChunk::new(ChunkKind::Object, tag, &text[whole.start..end]).with_properties(props),
        );
    }
}

fn parse_stylesheet(text: &str, out: &mut ChunkSink) {
    static RULE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("valid css rule regex"));
    static COMMENT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid css comment regex"));

    for caps in RULE.captures_iter(text) {
        let selector_match = caps.get(1).map_or(0..0, |m| m.range());
        let selector = COMMENT.replace_all(&caps[1], "");
        let selector = selector.trim();
        if selector.is_empty() || selector.starts_with('@') {
            continue;
        }
        let mut props = BTreeMap::new();
        for decl in caps[2].split(';') {
            if let Some((prop, value)) = decl.split_once(':') {
                let prop = prop.trim();
                if !prop.is_empty() {
                    props.insert(prop.to_string(), value.trim().to_string());
                }
            }
        }
        let lead = caps[1].len() - caps[1].trim_start().len();
        let start = selector_match.start + lead;
        let end = caps.get(0).map_or(start, |m| m.end());
        out.push(
            start,
            CodeChunk::new(ChunkKind::Object, selector, &text[start..end]).with_properties(props),
        );
    }
}

fn parse_structured(text: &str, out: &mut ChunkSink) {
    static PAIR: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#""((?:[^"\\]|\\.)*)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid json pair regex")
    });

    for caps in PAIR.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let mut props = BTreeMap::new();
        props.insert(caps[1].to_string(), caps[2].to_string());
        out.push(
            whole.start,
            CodeChunk::new(ChunkKind::Property, &caps[1], &text[whole]).with_properties(props),
        );
    }
}

/// Name of the synthetic chunk produced by the generic fallback.
pub const GENERIC_CHUNK_NAME: &str = "assignments";

fn parse_generic(text: &str, out: &mut ChunkSink) {
    static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[ \t]*([A-Za-z_][\w.-]*)[ \t]*[:=][ \t]*(.+?)[ \t]*$")
            .expect("valid generic assignment regex")
    });

    let mut props = BTreeMap::new();
    let mut matched = Vec::new();
    for line in text.lines() {
        if let Some(caps) = ASSIGNMENT.captures(line) {
            props.insert(caps[1].to_string(), caps[2].to_string());
            matched.push(line.trim());
        }
    }
    if !props.is_empty() {
        out.push(
            0,
            CodeChunk::new(ChunkKind::Variable, GENERIC_CHUNK_NAME, matched.join("\n"))
                .with_properties(props),
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Derived utilities
// ═══════════════════════════════════════════════════════════════════════

static COLOR_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)#[0-9a-f]{3,8}\b|\brgba?\s*\(").expect("valid color literal regex")
});

/// All chunk properties that look theme-related: the key mentions
/// color/background/theme/style, or the value is a color literal.
pub fn extract_theme_properties(chunks: &[CodeChunk]) -> BTreeMap<String, String> {
    let mut theme = BTreeMap::new();
    for chunk in chunks {
        for (key, value) in &chunk.properties {
            let k = key.to_lowercase();
            let themed = ["color", "background", "theme", "style"]
                .iter()
                .any(|needle| k.contains(needle));
            if themed || COLOR_LITERAL.is_match(value) {
                theme.insert(key.clone(), value.clone());
            }
        }
    }
    theme
}

/// Quoted string literals longer than three characters, in first-seen order.
pub fn extract_text_content(chunks: &[CodeChunk]) -> Vec<String> {
    // Every literal is consumed, short ones included, so quote pairs stay aligned.
    static QUOTED: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#""((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)'"#).expect("valid quoted regex")
    });

    let mut seen = HashSet::new();
    let mut texts = Vec::new();
    for chunk in chunks {
        for caps in QUOTED.captures_iter(&chunk.content) {
            let Some(m) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            if m.as_str().chars().count() <= 3 {
                continue;
            }
            let s = m.as_str().to_string();
            if seen.insert(s.clone()) {
                texts.push(s);
            }
        }
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn of_kind(chunks: &[CodeChunk], kind: ChunkKind) -> Vec<&CodeChunk> {
        chunks.iter().filter(|c| c.kind == kind).collect()
    }

    #[test]
    fn detects_language_families() {
        assert_eq!(Language::detect("fun main() {}"), Language::CurlyBrace);
        assert_eq!(
            Language::detect("class A : B() {\n}"),
            Language::CurlyBrace
        );
        assert_eq!(
            Language::detect("const x = 1;\nfunction f() {}"),
            Language::EcmaScript
        );
        assert_eq!(
            Language::detect("import os\n\ndef main():\n    pass"),
            Language::Python
        );
        assert_eq!(Language::detect("class Foo:\n    x = 1"), Language::Python);
        assert_eq!(
            Language::detect("class Foo(Base):\n    x = 1"),
            Language::Python
        );
        assert_eq!(
            Language::detect("class Login {\n    val title = \"Sign in\"\n}"),
            Language::CurlyBrace
        );
        assert_eq!(Language::detect("<div class=\"a\">x</div>"), Language::Markup);
        assert_eq!(
            Language::detect(".btn { color: red; }"),
            Language::Stylesheet
        );
        assert_eq!(Language::detect("{\"a\": \"b\"}"), Language::StructuredData);
        assert_eq!(Language::detect("title = Home"), Language::Generic);
    }

    #[test]
    fn hint_overrides_detection() {
        assert_eq!(resolve_language("x = 1", Some("py")), Language::Python);
        assert_eq!(resolve_language("x = 1", Some(".kt")), Language::CurlyBrace);
        assert_eq!(resolve_language("x = 1", Some("brainfuck")), Language::Generic);
    }

    #[test]
    fn two_kotlin_classes_with_properties() {
        let src = "class Login {\n    val title = \"Sign in\"\n    var attempts: Int = 0\n}\n\nclass Profile {\n    val name: String\n    const val MAX = 3\n}\n";
        let chunks = parse_to_chunks(src, None);
        let classes = of_kind(&chunks, ChunkKind::Class);
        assert_eq!(classes.len(), 2);

        assert_eq!(classes[0].name, "Login");
        assert_eq!(classes[0].properties["title"], "\"Sign in\"");
        assert_eq!(classes[0].properties["attempts"], "0");
        assert!(classes[0].content.starts_with("class Login {"));
        assert!(classes[0].content.ends_with('}'));

        assert_eq!(classes[1].name, "Profile");
        assert_eq!(classes[1].properties["name"], "String");
        assert_eq!(classes[1].properties["MAX"], "3");
    }

    #[test]
    fn untyped_braced_classes_are_sniffed_without_hint() {
        let src = "class Login {\n    val title = \"Sign in\"\n}\n\nclass Profile {\n    val name = \"Ann\"\n}\n";
        let chunks = parse_to_chunks(src, None);
        let classes = of_kind(&chunks, ChunkKind::Class);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].name, "Login");
        assert_eq!(classes[0].properties["title"], "\"Sign in\"");
        assert_eq!(classes[1].name, "Profile");
        assert_eq!(classes[1].properties["name"], "\"Ann\"");
    }

    #[test]
    fn class_only_python_block_yields_class_chunk() {
        let src = "class Settings:\n    theme = \"dark\"\n    color = \"#fff\"\n";
        let chunks = parse_to_chunks(src, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Class);
        assert_eq!(chunks[0].name, "Settings");
        assert_eq!(chunks[0].properties["theme"], "\"dark\"");
        assert_eq!(chunks[0].properties["color"], "\"#fff\"");
    }

    #[test]
    fn nested_bodies_are_captured_whole() {
        let src = "class Screen {\n    fun render() {\n        if (ok) {\n            draw()\n        }\n    }\n    val footer = \"bye\"\n}\n";
        let chunks = parse_to_chunks(src, Some("kotlin"));
        let class = of_kind(&chunks, ChunkKind::Class)[0];
        assert!(class.content.contains("val footer"));
        assert!(class.content.trim_end().ends_with('}'));
        assert_eq!(class.properties.len(), 1);

        let functions = of_kind(&chunks, ChunkKind::Function);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "render");
        assert!(functions[0].content.contains("draw()"));
        assert!(!functions[0].content.contains("footer"));
    }

    #[test]
    fn braces_in_strings_do_not_close_bodies() {
        let src = "fun label() {\n    val s = \"}\"\n    val t = '{'\n    // }\n    show(s)\n}\n";
        let chunks = parse_to_chunks(src, None);
        let f = of_kind(&chunks, ChunkKind::Function)[0];
        assert!(f.content.contains("show(s)"));
        assert_eq!(f.properties["s"], "\"}\"");
    }

    #[test]
    fn kotlin_objects_functions_and_top_level_bindings() {
        let src = "val BASE_URL = \"https://api.example.com\"\n\nobject Theme {\n    val primaryColor = \"#FF5722\"\n}\n\nfun area(w: Int, h: Int) = w * h\n";
        let chunks = parse_to_chunks(src, None);
        let vars = of_kind(&chunks, ChunkKind::Variable);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "BASE_URL");
        assert_eq!(vars[0].properties["value"], "\"https://api.example.com\"");

        let objects = of_kind(&chunks, ChunkKind::Object);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].properties["primaryColor"], "\"#FF5722\"");

        let f = of_kind(&chunks, ChunkKind::Function)[0];
        assert_eq!(f.name, "area");
        assert_eq!(f.content, "fun area(w: Int, h: Int) = w * h");
    }

    #[test]
    fn java_methods_are_functions() {
        let src = "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"hi\");\n    }\n}\n";
        let chunks = parse_to_chunks(src, Some("java"));
        assert_eq!(of_kind(&chunks, ChunkKind::Class)[0].name, "Main");
        let f = of_kind(&chunks, ChunkKind::Function);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].name, "main");
    }

    #[test]
    fn chunks_are_ordered_by_position() {
        let src = "fun b() {}\nclass A {\n}\nfun c() {}\n";
        let names: Vec<String> = parse_to_chunks(src, None)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["b", "A", "c"]);
    }

    #[test]
    fn ecmascript_functions_and_object_literals() {
        let src = "const theme = {\n  primary: '#3366ff',\n  \"font-size\": \"14px\",\n  nested: { a: 1 },\n};\n\nfunction greet(name) {\n  return `Hello ${name}`;\n}\n\nconst add = (a, b) => {\n  return a + b;\n};\n\nexport class Store {\n  count = 0;\n}\n";
        let chunks = parse_to_chunks(src, Some("js"));

        let obj = of_kind(&chunks, ChunkKind::Object)[0];
        assert_eq!(obj.name, "theme");
        assert_eq!(obj.properties["primary"], "#3366ff");
        assert_eq!(obj.properties["font-size"], "14px");
        assert_eq!(obj.properties["nested"], "{ a: 1 }");

        let fns: Vec<&str> = of_kind(&chunks, ChunkKind::Function)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(fns, vec!["greet", "add"]);

        let class = of_kind(&chunks, ChunkKind::Class)[0];
        assert_eq!(class.name, "Store");
        assert_eq!(class.properties["count"], "0");
    }

    #[test]
    fn python_blocks_follow_indentation() {
        let src = "import os\n\nclass Greeter:\n    greeting = \"hello\"\n\n    def __init__(self, name):\n        self.name = name\n\n    def greet(self):\n        return self.greeting\n\ndef main():\n    g = Greeter(\"x\")\n    print(g.greet())\n";
        let chunks = parse_to_chunks(src, None);

        let class = of_kind(&chunks, ChunkKind::Class)[0];
        assert_eq!(class.name, "Greeter");
        assert_eq!(class.properties["greeting"], "\"hello\"");
        assert_eq!(class.properties["name"], "name");
        assert!(class.content.contains("return self.greeting"));
        assert!(!class.content.contains("def main"));

        let fns: Vec<&str> = of_kind(&chunks, ChunkKind::Function)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(fns, vec!["__init__", "greet", "main"]);
        let main = chunks.iter().find(|c| c.name == "main").unwrap();
        assert_eq!(main.properties["g"], "Greeter(\"x\")");
    }

    #[test]
    fn markup_elements_with_attributes() {
        let src = "<div id=\"root\">\n  <button color=\"#ff0000\" type='submit'>Send</button>\n  <img src=\"a.png\"/>\n</div>";
        let chunks = parse_to_chunks(src, None);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "div");
        assert_eq!(chunks[0].properties["id"], "root");
        assert_eq!(chunks[1].name, "button");
        assert_eq!(chunks[1].properties["color"], "#ff0000");
        assert_eq!(chunks[1].properties["type"], "submit");
        assert_eq!(chunks[1].properties["text"], "Send");
    }

    #[test]
    fn stylesheet_rules() {
        let src = "/* main */\n.btn-primary {\n  color: #fff;\n  background: rgb(0, 0, 255);\n}\nh1 { font-size: 2em }";
        let chunks = parse_to_chunks(src, None);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, ".btn-primary");
        assert_eq!(chunks[0].properties["color"], "#fff");
        assert_eq!(chunks[0].properties["background"], "rgb(0, 0, 255)");
        assert_eq!(chunks[1].name, "h1");
        assert_eq!(chunks[1].properties["font-size"], "2em");
    }

    #[test]
    fn structured_data_string_pairs() {
        let src = "{\n  \"title\": \"Welcome\",\n  \"count\": 3,\n  \"theme\": \"dark\"\n}";
        let chunks = parse_to_chunks(src, None);
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["title", "theme"]);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Property));
    }

    #[test]
    fn generic_fallback_collects_assignments() {
        let src = "title = Home\nsubtitle: Welcome back\njust prose here";
        let chunks = parse_to_chunks(src, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, GENERIC_CHUNK_NAME);
        assert_eq!(chunks[0].properties["title"], "Home");
        assert_eq!(chunks[0].properties["subtitle"], "Welcome back");
    }

    #[test]
    fn unmatched_input_yields_no_chunks() {
        assert!(parse_to_chunks("", None).is_empty());
        assert!(parse_to_chunks("nothing structured at all", None).is_empty());
    }

    #[test]
    fn theme_properties_by_key_or_color_value() {
        let mut a = BTreeMap::new();
        a.insert("backgroundColor".to_string(), "white".to_string());
        a.insert("accent".to_string(), "#00ff00".to_string());
        a.insert("label".to_string(), "Save".to_string());
        let mut b = BTreeMap::new();
        b.insert("shadow".to_string(), "rgba(0,0,0,0.2)".to_string());
        let chunks = vec![
            CodeChunk::new(ChunkKind::Object, "a", "").with_properties(a),
            CodeChunk::new(ChunkKind::Object, "b", "").with_properties(b),
        ];
        let theme = extract_theme_properties(&chunks);
        assert_eq!(theme.len(), 3);
        assert!(theme.contains_key("backgroundColor"));
        assert!(theme.contains_key("accent"));
        assert!(theme.contains_key("shadow"));
    }

    #[test]
    fn text_content_skips_short_literals() {
        let chunks = vec![
            CodeChunk::new(ChunkKind::Function, "f", "show(\"Welcome home\"); x(\"ok\"); y('Goodbye'); show(\"Welcome home\")"),
        ];
        assert_eq!(
            extract_text_content(&chunks),
            vec!["Welcome home".to_string(), "Goodbye".to_string()]
        );
    }
}
