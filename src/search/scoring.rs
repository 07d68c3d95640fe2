//! Match location and relevance heuristics
//!
//! Two independent scores are produced and they are not comparable:
//! - `proximity_score` for exact and structural matches: how early in the
//!   line the match starts, `max(0.1, 1 - offset / line_length)`.
//! - `overlap_score` for semantic matches: the share of query tokens that
//!   also appear in the line.
//!
//! Neither is a statistically grounded relevance measure.

use std::collections::HashSet;

/// Lower-case, replace punctuation with spaces, split on whitespace and drop
/// tokens of two characters or fewer
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Character offset of the first occurrence of `needle` in `haystack`
pub fn find_offset(haystack: &str, needle: &str, case_sensitive: bool) -> Option<usize> {
    let fold = |c: char| {
        if case_sensitive {
            c
        } else {
            c.to_lowercase().next().unwrap_or(c)
        }
    };

    let hay: Vec<char> = haystack.chars().map(fold).collect();
    let pat: Vec<char> = needle.chars().map(fold).collect();

    if pat.is_empty() {
        return Some(0);
    }
    if pat.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - pat.len()).find(|&start| hay[start..start + pat.len()] == pat[..])
}

/// Offset-proximity heuristic for non-semantic matches
pub fn proximity_score(offset: usize, line_length: usize) -> f64 {
    if line_length == 0 {
        return 1.0;
    }
    (1.0 - offset as f64 / line_length as f64).max(0.1)
}

/// Shared-token ratio for semantic matches
#[derive(Debug, Clone, PartialEq)]
pub struct Overlap {
    /// Query tokens found in the line, in query order
    pub shared: Vec<String>,
    pub score: f64,
}

pub fn overlap_score(query_tokens: &[String], content: &str) -> Option<Overlap> {
    if query_tokens.is_empty() {
        return None;
    }

    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    let mut seen = HashSet::new();
    let shared: Vec<String> = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t) && seen.insert(t.as_str()))
        .cloned()
        .collect();

    if shared.is_empty() {
        return None;
    }

    let unique_query: HashSet<&String> = query_tokens.iter().collect();
    Some(Overlap {
        score: shared.len() as f64 / unique_query.len() as f64,
        shared,
    })
}

/// Characters around a match: `radius` before the offset and after its end
pub fn context_window(content: &str, offset: usize, match_len: usize, radius: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let start = offset.saturating_sub(radius).min(chars.len());
    let end = offset
        .saturating_add(match_len)
        .saturating_add(radius)
        .min(chars.len());
    chars[start..end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Fetch the user_id, then os.getcwd()!"),
            vec!["fetch", "the", "user_id", "then", "getcwd"]
        );
        assert!(tokenize("a b if").is_empty());
    }

    #[test]
    fn test_find_offset() {
        assert_eq!(find_offset("let Value = 1", "value", false), Some(4));
        assert_eq!(find_offset("let Value = 1", "value", true), None);
        assert_eq!(find_offset("héllo wörld", "WÖR", false), Some(6));
        assert_eq!(find_offset("short", "much longer", false), None);
    }

    #[test]
    fn test_proximity_score() {
        assert_eq!(proximity_score(0, 10), 1.0);
        assert!((proximity_score(5, 10) - 0.5).abs() < 1e-9);
        assert!((proximity_score(99, 100) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_score() {
        let query = tokenize("load user profile");
        let overlap = overlap_score(&query, "function loadProfile(user) { profile = load(user) }").unwrap();
        assert_eq!(overlap.shared, vec!["load", "user", "profile"]);
        assert!((overlap.score - 1.0).abs() < 1e-9);

        assert!(overlap_score(&query, "nothing relevant here").is_none());
        assert!(overlap_score(&[], "anything").is_none());
    }

    #[test]
    fn test_context_window() {
        let line = "0123456789abcdefghij";
        assert_eq!(context_window(line, 10, 2, 3), "789abcde");
        assert_eq!(context_window(line, 1, 1, 5), "0123456");
        assert_eq!(context_window(line, 18, 2, 5), "defghij");
    }
}
