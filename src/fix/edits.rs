//! Span edits over a file's text

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Replace `start..end` (byte offsets into the whole file) with `replacement`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// 1-based line the edit belongs to
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn replace(line: usize, span: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            line,
            start: span.start,
            end: span.end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(line: usize, at: usize, text: impl Into<String>) -> Self {
        Self::replace(line, at..at, text)
    }

    pub fn delete(line: usize, span: Range<usize>) -> Self {
        Self::replace(line, span, "")
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether two edits touch the same bytes
    ///
    /// An insertion conflicts with a replacement that strictly covers its
    /// position; two insertions never conflict.
    pub fn overlaps(&self, other: &Edit) -> bool {
        let (a, b) = (self.span(), other.span());
        if a.is_empty() {
            b.start < a.start && a.start < b.end
        } else if b.is_empty() {
            a.start < b.start && b.start < a.end
        } else {
            a.start < b.end && b.start < a.end
        }
    }
}

/// Apply edits back-to-front so earlier offsets stay valid
///
/// Edits must not overlap one another and must fall on character boundaries.
pub fn apply_edits(content: &str, edits: &[Edit]) -> String {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| b.end.cmp(&a.end)));

    let mut output = content.to_string();
    for edit in ordered {
        let end = edit.end.min(output.len());
        let start = edit.start.min(end);
        output.replace_range(start..end, &edit.replacement);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_back_to_front() {
        let content = "a == b\nconsole.log(a)\nc != d\n";
        let edits = vec![
            Edit::insert(1, 4, "="),
            Edit::delete(2, 7..22),
            Edit::insert(3, 26, "="),
        ];
        assert_eq!(apply_edits(content, &edits), "a === b\nc !== d\n");
    }

    #[test]
    fn test_overlaps() {
        let remove_line = Edit::delete(2, 7..22);
        assert!(remove_line.overlaps(&Edit::insert(2, 10, "=")));
        assert!(!remove_line.overlaps(&Edit::insert(3, 22, "=")));
        assert!(!Edit::insert(1, 4, "=").overlaps(&Edit::insert(1, 4, "=")));
        assert!(Edit::replace(1, 0..5, "x").overlaps(&Edit::replace(1, 4..8, "y")));
        assert!(!Edit::replace(1, 0..4, "x").overlaps(&Edit::replace(1, 4..8, "y")));
    }

    #[test]
    fn test_multibyte_content() {
        let content = "let é = x == y;\n";
        let at = content.find("==").unwrap() + 2;
        assert_eq!(apply_edits(content, &[Edit::insert(1, at, "=")]), "let é = x === y;\n");
    }
}
