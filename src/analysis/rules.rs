//! Detection rules
//!
//! Every rule looks at one line of a `SourceModel` at a time and reports at
//! most one finding per line, which keeps issue ids unique per
//! (file, line, rule). Rules that can repair what they flag also produce the
//! span edits for it, recomputed from whatever the file holds when asked.

use super::model::{ModelLine, SourceModel};
use super::{IssueType, Severity};
use crate::config::AnalysisSettings;
use crate::fix::Edit;
use crate::scan::{CommentStyle, Language};
use regex::Regex;
use std::sync::OnceLock;

/// A finding on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// 1-based character column
    pub column: usize,
    pub message: String,
}

/// Trait for line rules
pub trait Rule: Send + Sync {
    /// Stable identifier stored with every issue
    fn id(&self) -> &'static str;

    fn issue_type(&self) -> IssueType;

    fn severity(&self) -> Severity;

    fn description(&self) -> String;

    fn suggestion(&self) -> Option<&'static str> {
        None
    }

    fn applies_to(&self, language: Language) -> bool;

    fn check(&self, model: &SourceModel, line: &ModelLine) -> Option<RuleMatch>;

    fn fixable(&self) -> bool {
        false
    }

    /// Edits that resolve this rule's finding on the line, if it can be repaired
    fn fix(&self, _model: &SourceModel, _line: &ModelLine) -> Option<Vec<Edit>> {
        None
    }
}

/// The rule catalogue
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// Every rule, regardless of configuration
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            rules: vec![
                Box::new(NoConsoleRule),
                Box::new(EqEqEqRule),
                Box::new(NoExplicitAnyRule),
                Box::new(NoWildcardImportRule),
                Box::new(TodoCommentRule),
                Box::new(MaxLineLengthRule {
                    limit: settings.max_line_length,
                }),
            ],
        }
    }

    /// Rules not listed in `disabled_rules`
    pub fn enabled(settings: &AnalysisSettings) -> Self {
        let mut set = Self::new(settings);
        set.rules
            .retain(|rule| !settings.disabled_rules.iter().any(|id| id == rule.id()));
        set
    }

    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules.iter().find(|r| r.id() == id).map(|r| r.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }
}

struct Patterns {
    console_call: Regex,
    console_statement: Regex,
    any_annotation: Regex,
    python_wildcard: Regex,
    java_wildcard: Regex,
    rust_wildcard: Regex,
    todo_marker: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        console_call: Regex::new(
            r"\bconsole\s*\.\s*(log|debug|info|warn|error|trace|dir|table)\s*\(",
        )
        .expect("valid regex"),
        console_statement: Regex::new(r"^\s*console\s*\.\s*\w+\s*\(.*\)\s*;?\s*$")
            .expect("valid regex"),
        any_annotation: Regex::new(r":\s*(any)\b").expect("valid regex"),
        python_wildcard: Regex::new(r"^\s*from\s+[\w\.]+\s+import\s+(\*)").expect("valid regex"),
        java_wildcard: Regex::new(r"^\s*import\s+(?:static\s+)?[\w\.]+\.(\*)\s*;")
            .expect("valid regex"),
        rust_wildcard: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+[\w:]+::(\*)\s*;")
            .expect("valid regex"),
        todo_marker: Regex::new(r"\b(TODO|FIXME|XXX|HACK)\b").expect("valid regex"),
    })
}

/// 1-based character column of a byte offset within a line
fn column_of(line: &ModelLine, byte: usize) -> usize {
    line.text[..byte.min(line.text.len())].chars().count() + 1
}

// ==================== Fixable rules ====================

/// Debug output left in JavaScript/TypeScript
struct NoConsoleRule;

impl Rule for NoConsoleRule {
    fn id(&self) -> &'static str {
        "no-console"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::CodeSmell
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn description(&self) -> String {
        "Console output is debugging residue and should not ship".to_string()
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Remove the statement or route it through a logger")
    }

    fn applies_to(&self, language: Language) -> bool {
        language.is_script()
    }

    fn check(&self, _model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let caps = patterns().console_call.captures(&line.code)?;
        let whole = caps.get(0)?;
        Some(RuleMatch {
            column: column_of(line, whole.start()),
            message: format!("Unexpected console.{} statement", &caps[1]),
        })
    }

    fn fixable(&self) -> bool {
        true
    }

    /// Drops the whole line, only when it holds nothing but one complete call
    fn fix(&self, _model: &SourceModel, line: &ModelLine) -> Option<Vec<Edit>> {
        if !patterns().console_statement.is_match(&line.code) {
            return None;
        }
        let opens = line.code.matches('(').count();
        let closes = line.code.matches(')').count();
        if opens != closes {
            return None;
        }
        Some(vec![Edit::delete(line.number, line.span.clone())])
    }
}

/// `==` and `!=` in JavaScript/TypeScript
struct EqEqEqRule;

/// Byte offsets and operators of loose comparisons in a code view
fn loose_equality(code: &str) -> Vec<(usize, &'static str)> {
    let bytes = code.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        let op = match (bytes[i], bytes[i + 1]) {
            (b'=', b'=') => "==",
            (b'!', b'=') => "!=",
            _ => {
                i += 1;
                continue;
            }
        };
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 2).copied();
        let extends_other = matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) && op == "==";
        if next == Some(b'=') || extends_other {
            // part of `===`, `!==`, `<==`: skip the whole operator
            i += 2;
            while bytes.get(i) == Some(&b'=') {
                i += 1;
            }
            continue;
        }
        found.push((i, op));
        i += 2;
    }

    found
}

impl Rule for EqEqEqRule {
    fn id(&self) -> &'static str {
        "eqeqeq"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::Bug
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn description(&self) -> String {
        "Loose equality coerces operand types before comparing".to_string()
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Use === or !== instead")
    }

    fn applies_to(&self, language: Language) -> bool {
        language.is_script()
    }

    fn check(&self, _model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let (offset, op) = *loose_equality(&line.code).first()?;
        Some(RuleMatch {
            column: column_of(line, offset),
            message: format!("Expected '{}=' and instead saw '{}'", op, op),
        })
    }

    fn fixable(&self) -> bool {
        true
    }

    fn fix(&self, _model: &SourceModel, line: &ModelLine) -> Option<Vec<Edit>> {
        let found = loose_equality(&line.code);
        if found.is_empty() {
            return None;
        }
        Some(
            found
                .into_iter()
                .map(|(offset, _)| Edit::insert(line.number, line.offset() + offset + 2, "="))
                .collect(),
        )
    }
}

/// `: any` annotations in TypeScript
struct NoExplicitAnyRule;

impl Rule for NoExplicitAnyRule {
    fn id(&self) -> &'static str {
        "no-explicit-any"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::Maintainability
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn description(&self) -> String {
        "An `any` annotation switches off type checking for the value".to_string()
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Use `unknown` and narrow, or declare the real type")
    }

    fn applies_to(&self, language: Language) -> bool {
        language == Language::TypeScript
    }

    fn check(&self, model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let caps = patterns().any_annotation.captures(&line.code)?;
        let token = caps.get(1)?;
        let message = match model.enclosing_declaration(line.number) {
            Some(decl) => format!("Unexpected any in {}. Specify a different type", decl.name),
            None => "Unexpected any. Specify a different type".to_string(),
        };
        Some(RuleMatch {
            column: column_of(line, token.start()),
            message,
        })
    }

    fn fixable(&self) -> bool {
        true
    }

    fn fix(&self, _model: &SourceModel, line: &ModelLine) -> Option<Vec<Edit>> {
        let edits: Vec<Edit> = patterns()
            .any_annotation
            .captures_iter(&line.code)
            .filter_map(|caps| caps.get(1))
            .map(|token| {
                let start = line.offset() + token.start();
                Edit::replace(line.number, start..start + token.len(), "unknown")
            })
            .collect();
        if edits.is_empty() {
            None
        } else {
            Some(edits)
        }
    }
}

// ==================== Report-only rules ====================

struct NoWildcardImportRule;

impl Rule for NoWildcardImportRule {
    fn id(&self) -> &'static str {
        "no-wildcard-import"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::Maintainability
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn description(&self) -> String {
        "Wildcard imports hide where names come from".to_string()
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Import the names you use explicitly")
    }

    fn applies_to(&self, language: Language) -> bool {
        matches!(language, Language::Python | Language::Java | Language::Rust)
    }

    fn check(&self, model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let p = patterns();
        let regex = match model.language {
            Language::Python => &p.python_wildcard,
            Language::Java => &p.java_wildcard,
            Language::Rust => &p.rust_wildcard,
            _ => return None,
        };
        let star = regex.captures(&line.code)?.get(1)?;
        Some(RuleMatch {
            column: column_of(line, star.start()),
            message: "Wildcard import".to_string(),
        })
    }
}

struct TodoCommentRule;

impl Rule for TodoCommentRule {
    fn id(&self) -> &'static str {
        "todo-comment"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::Maintainability
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn description(&self) -> String {
        "Marker comments record work that was never finished".to_string()
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Resolve the note or move it to the issue tracker")
    }

    fn applies_to(&self, language: Language) -> bool {
        language.comment_style() != CommentStyle::None
    }

    fn check(&self, _model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let marker = patterns().todo_marker.captures(&line.comment)?.get(1)?;
        Some(RuleMatch {
            column: column_of(line, marker.start()),
            message: format!("Unresolved {} comment", marker.as_str()),
        })
    }
}

struct MaxLineLengthRule {
    limit: usize,
}

impl Rule for MaxLineLengthRule {
    fn id(&self) -> &'static str {
        "max-line-length"
    }

    fn issue_type(&self) -> IssueType {
        IssueType::Style
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn description(&self) -> String {
        format!("Lines should not exceed {} characters", self.limit)
    }

    fn suggestion(&self) -> Option<&'static str> {
        Some("Break the line up")
    }

    fn applies_to(&self, _language: Language) -> bool {
        true
    }

    fn check(&self, _model: &SourceModel, line: &ModelLine) -> Option<RuleMatch> {
        let length = line.text.chars().count();
        if length <= self.limit {
            return None;
        }
        Some(RuleMatch {
            column: self.limit + 1,
            message: format!("Line is {} characters long (limit {})", length, self.limit),
        })
    }
}
