//! Line-oriented structural model of a source file
//!
//! Each line is split into two byte-aligned views of its text: `code`, where
//! comments and string literal contents are blanked with spaces, and
//! `comment`, where everything except comment text is blanked. Rules match
//! against whichever view they care about, so a `==` inside a string or a
//! `console.log` inside a comment never fires.

use crate::scan::{CommentStyle, Language};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Code,
    Comment,
    Blank,
}

/// One physical line
#[derive(Debug, Clone)]
pub struct ModelLine {
    /// 1-based
    pub number: usize,
    /// Raw text without the line terminator
    pub text: String,
    pub code: String,
    pub comment: String,
    pub kind: LineKind,
    /// Byte range of the line in the file, terminator included
    pub span: Range<usize>,
}

impl ModelLine {
    /// Byte offset of the first character in the file
    pub fn offset(&self) -> usize {
        self.span.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Class,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct SourceModel {
    pub language: Language,
    pub lines: Vec<ModelLine>,
    pub declarations: Vec<Declaration>,
}

impl SourceModel {
    /// Parse with the parser suited to the language
    pub fn parse(language: Language, source: &str) -> Self {
        SourceParser::for_language(language).parse(language, source)
    }

    pub fn line(&self, number: usize) -> Option<&ModelLine> {
        number.checked_sub(1).and_then(|idx| self.lines.get(idx))
    }

    /// Nearest function or class declared at or above a line
    pub fn enclosing_declaration(&self, line: usize) -> Option<&Declaration> {
        self.declarations
            .iter()
            .rev()
            .filter(|d| d.kind != DeclarationKind::Variable)
            .find(|d| d.line <= line)
    }
}

/// Lexer family; one variant per comment/string convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceParser {
    /// `//` and `/* */` comments, quoted strings
    CFamily { backtick_strings: bool, char_literals: bool },
    /// `#` comments, quoted and triple-quoted strings
    Hash,
    /// No comment or string syntax
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    BlockComment,
    Str(char),
    TripleStr(char),
}

impl SourceParser {
    pub fn for_language(language: Language) -> Self {
        match language.comment_style() {
            CommentStyle::Slash => SourceParser::CFamily {
                backtick_strings: matches!(
                    language,
                    Language::JavaScript | Language::TypeScript | Language::Go
                ),
                char_literals: matches!(language, Language::Rust),
            },
            CommentStyle::Hash => SourceParser::Hash,
            _ => SourceParser::Plain,
        }
    }

    pub fn parse(&self, language: Language, source: &str) -> SourceModel {
        let mut state = LexState::Normal;
        let mut lines = Vec::new();
        let mut offset = 0;

        for (idx, raw) in source.split_inclusive('\n').enumerate() {
            let text = raw.trim_end_matches('\n').trim_end_matches('\r');
            let (code, comment) = match self {
                SourceParser::CFamily {
                    backtick_strings,
                    char_literals,
                } => lex_c_family(text, &mut state, *backtick_strings, *char_literals),
                SourceParser::Hash => lex_hash(text, &mut state),
                SourceParser::Plain => (text.to_string(), " ".repeat(text.len())),
            };

            let kind = if text.trim().is_empty() {
                LineKind::Blank
            } else if code.trim().is_empty() && !comment.trim().is_empty() {
                LineKind::Comment
            } else {
                LineKind::Code
            };

            lines.push(ModelLine {
                number: idx + 1,
                text: text.to_string(),
                code,
                comment,
                kind,
                span: offset..offset + raw.len(),
            });
            offset += raw.len();
        }

        let declarations = find_declarations(self, &lines);
        SourceModel {
            language,
            lines,
            declarations,
        }
    }
}

/// Byte-aligned blanking of a view
struct Views {
    code: Vec<u8>,
    comment: Vec<u8>,
}

impl Views {
    fn new(text: &str) -> Self {
        Self {
            code: text.as_bytes().to_vec(),
            comment: vec![b' '; text.len()],
        }
    }

    fn blank_code(&mut self, range: Range<usize>) {
        for b in &mut self.code[range] {
            *b = b' ';
        }
    }

    fn mark_comment(&mut self, text: &str, range: Range<usize>) {
        self.comment[range.clone()].copy_from_slice(&text.as_bytes()[range.clone()]);
        self.blank_code(range);
    }

    fn finish(self) -> (String, String) {
        // Blanking always covers whole characters, so both views stay UTF-8
        (
            String::from_utf8_lossy(&self.code).into_owned(),
            String::from_utf8_lossy(&self.comment).into_owned(),
        )
    }
}

fn lex_c_family(
    text: &str,
    state: &mut LexState,
    backtick_strings: bool,
    char_literals: bool,
) -> (String, String) {
    let mut views = Views::new(text);
    let bytes = text.as_bytes();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let width = c.len_utf8();
        match *state {
            LexState::BlockComment => {
                if text[i..].starts_with("*/") {
                    views.mark_comment(text, i..i + 2);
                    chars.next();
                    *state = LexState::Normal;
                } else {
                    views.mark_comment(text, i..i + width);
                }
            }
            LexState::Str(quote) | LexState::TripleStr(quote) => {
                if c == '\\' {
                    let next_width = chars.peek().map(|(_, n)| n.len_utf8()).unwrap_or(0);
                    views.blank_code(i..i + width + next_width);
                    chars.next();
                } else if c == quote {
                    *state = LexState::Normal;
                } else {
                    views.blank_code(i..i + width);
                }
            }
            LexState::Normal => {
                if text[i..].starts_with("//") {
                    views.mark_comment(text, i..text.len());
                    break;
                } else if text[i..].starts_with("/*") {
                    views.mark_comment(text, i..i + 2);
                    chars.next();
                    *state = LexState::BlockComment;
                } else if c == '"' || (c == '`' && backtick_strings) {
                    *state = LexState::Str(c);
                } else if c == '\'' && (!char_literals || is_char_literal(bytes, i)) {
                    *state = LexState::Str(c);
                }
            }
        }
    }

    // Only backtick strings and block comments continue onto the next line
    if matches!(*state, LexState::Str(q) if q != '`') {
        *state = LexState::Normal;
    }

    views.finish()
}

/// `'x'` or `'\n'`, as opposed to a lifetime such as `'a`
fn is_char_literal(bytes: &[u8], quote: usize) -> bool {
    match bytes.get(quote + 1) {
        Some(b'\\') => true,
        Some(_) => {
            let rest = &bytes[quote + 1..];
            let first_len = std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.chars().next())
                .map(char::len_utf8)
                .unwrap_or(1);
            rest.get(first_len) == Some(&b'\'')
        }
        None => false,
    }
}

fn lex_hash(text: &str, state: &mut LexState) -> (String, String) {
    let mut views = Views::new(text);
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let width = c.len_utf8();
        match *state {
            LexState::TripleStr(quote) => {
                let closing = if quote == '"' { "\"\"\"" } else { "'''" };
                if text[i..].starts_with(closing) {
                    chars.next();
                    chars.next();
                    *state = LexState::Normal;
                } else {
                    views.blank_code(i..i + width);
                }
            }
            LexState::Str(quote) => {
                if c == '\\' {
                    let next_width = chars.peek().map(|(_, n)| n.len_utf8()).unwrap_or(0);
                    views.blank_code(i..i + width + next_width);
                    chars.next();
                } else if c == quote {
                    *state = LexState::Normal;
                } else {
                    views.blank_code(i..i + width);
                }
            }
            LexState::Normal | LexState::BlockComment => {
                if c == '#' {
                    views.mark_comment(text, i..text.len());
                    break;
                } else if text[i..].starts_with("\"\"\"") || text[i..].starts_with("'''") {
                    chars.next();
                    chars.next();
                    *state = LexState::TripleStr(c);
                } else if c == '"' || c == '\'' {
                    *state = LexState::Str(c);
                }
            }
        }
    }

    if matches!(*state, LexState::Str(_)) {
        *state = LexState::Normal;
    }

    views.finish()
}

struct DeclarationPatterns {
    c_function: Regex,
    c_class: Regex,
    c_variable: Regex,
    rust_fn: Regex,
    go_func: Regex,
    hash_function: Regex,
    hash_class: Regex,
}

fn declaration_patterns() -> &'static DeclarationPatterns {
    static PATTERNS: OnceLock<DeclarationPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DeclarationPatterns {
        c_function: Regex::new(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        )
        .expect("valid regex"),
        c_class: Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:public\s+)?class\s+([A-Za-z_$][\w$]*)")
            .expect("valid regex"),
        c_variable: Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)")
            .expect("valid regex"),
        rust_fn: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)")
            .expect("valid regex"),
        go_func: Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)").expect("valid regex"),
        hash_function: Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)").expect("valid regex"),
        hash_class: Regex::new(r"^\s*class\s+(\w+)").expect("valid regex"),
    })
}

fn find_declarations(parser: &SourceParser, lines: &[ModelLine]) -> Vec<Declaration> {
    let p = declaration_patterns();
    let candidates: Vec<(&Regex, DeclarationKind)> = match parser {
        SourceParser::CFamily { .. } => vec![
            (&p.c_function, DeclarationKind::Function),
            (&p.rust_fn, DeclarationKind::Function),
            (&p.go_func, DeclarationKind::Function),
            (&p.c_class, DeclarationKind::Class),
            (&p.c_variable, DeclarationKind::Variable),
        ],
        SourceParser::Hash => vec![
            (&p.hash_function, DeclarationKind::Function),
            (&p.hash_class, DeclarationKind::Class),
        ],
        SourceParser::Plain => return Vec::new(),
    };

    lines
        .iter()
        .filter(|line| line.kind == LineKind::Code)
        .filter_map(|line| {
            candidates.iter().find_map(|(regex, kind)| {
                regex.captures(&line.code).map(|caps| Declaration {
                    kind: *kind,
                    name: caps[1].to_string(),
                    line: line.number,
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_and_comments_are_masked() {
        let model = SourceModel::parse(
            Language::JavaScript,
            "const s = \"a == b\"; // console.log(x)\nlet t = 'it\\'s';\n",
        );

        let first = &model.lines[0];
        assert_eq!(first.code.len(), first.text.len());
        assert!(!first.code.contains("=="));
        assert!(!first.code.contains("console"));
        assert!(first.comment.contains("console.log(x)"));
        assert_eq!(first.kind, LineKind::Code);

        let second = &model.lines[1];
        assert!(!second.code.contains("it"));
        assert_eq!(second.code, "let t = '     ';");
    }

    #[test]
    fn test_block_comments_span_lines() {
        let model = SourceModel::parse(
            Language::TypeScript,
            "/* start\n x == y\n end */ let a = 1;\n\n",
        );
        let kinds: Vec<_> = model.lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![LineKind::Comment, LineKind::Comment, LineKind::Code, LineKind::Blank]
        );
        assert!(model.lines[2].code.contains("let a = 1;"));
    }

    #[test]
    fn test_rust_lifetimes_are_not_strings() {
        let model = SourceModel::parse(Language::Rust, "fn f<'a>(x: &'a str) -> char { 'x' }\n");
        let code = &model.lines[0].code;
        assert!(code.contains("&'a str"));
        assert_eq!(model.declarations[0].name, "f");
    }

    #[test]
    fn test_python_triple_quotes() {
        let model = SourceModel::parse(
            Language::Python,
            "def run():\n    \"\"\"TODO: docs\n    more\"\"\"\n    x = 1  # TODO later\n",
        );
        assert!(!model.lines[1].code.contains("TODO"));
        assert!(model.lines[3].comment.contains("TODO later"));
        assert_eq!(model.declarations.len(), 1);
        assert_eq!(model.declarations[0].kind, DeclarationKind::Function);
    }

    #[test]
    fn test_spans_and_declarations() {
        let src = "class Repo {}\r\nexport async function load(id) {\n  const row = get(id);\n}\n";
        let model = SourceModel::parse(Language::JavaScript, src);

        assert_eq!(model.lines[0].text, "class Repo {}");
        assert_eq!(model.lines[1].offset(), "class Repo {}\r\n".len());
        assert_eq!(model.lines.last().unwrap().span.end, src.len());

        let names: Vec<_> = model.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Repo", "load", "row"]);
        assert_eq!(model.enclosing_declaration(3).unwrap().name, "load");
    }
}
