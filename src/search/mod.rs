//! Line-level search engine
//!
//! The engine keeps its own table of every physical line in the project,
//! built lazily on first search and rebuilt only on request. Queries are
//! answered from that table, so edits made after a build are not visible
//! until `build_search_index` runs again.

mod scoring;

pub use scoring::{context_window, find_offset, overlap_score, proximity_score, tokenize, Overlap};

use crate::config::WorkspaceConfig;
use crate::error::{ensure_directory, CoreError, FileError};
use crate::scan::{self, CommentStyle, Language, PathMatcher, WalkLimits};
use crate::storage::{LineQuery, SearchStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Declaration keywords tried, in order, when upgrading a structural match
const DECLARATION_KEYWORDS: &[&str] = &["function", "class", "const", "let"];

/// How a stored line was classified at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Comment,
}

impl ContentType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "comment" => ContentType::Comment,
            _ => ContentType::Code,
        }
    }

    /// A trimmed line starting with a line-comment marker is a comment
    pub fn classify(line: &str, style: CommentStyle) -> Self {
        let trimmed = line.trim_start();
        let markers: &[&str] = match style {
            CommentStyle::Slash => &["//", "/*", "*"],
            CommentStyle::Hash => &["#"],
            CommentStyle::DoubleDash => &["--"],
            CommentStyle::None => &[],
        };

        if markers.iter().any(|m| trimmed.starts_with(m)) {
            ContentType::Comment
        } else {
            ContentType::Code
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Code => write!(f, "code"),
            ContentType::Comment => write!(f, "comment"),
        }
    }
}

/// One physical line of a project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLine {
    pub project_path: String,
    pub file_path: String,
    pub content_type: ContentType,
    pub content: String,
    /// 1-based
    pub line_number: usize,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryHistoryEntry {
    pub query: String,
    pub result_count: usize,
    pub query_type: String,
    pub searched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Exact,
    Semantic,
    Structural,
}

impl FromStr for MatchType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MatchType::Exact),
            "semantic" => Ok(MatchType::Semantic),
            "structural" => Ok(MatchType::Structural),
            other => Err(CoreError::UnknownMatchType(other.to_string())),
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Semantic => write!(f, "semantic"),
            MatchType::Structural => write!(f, "structural"),
        }
    }
}

/// Options for `build_search_index`; unset fields take the workspace defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub success: bool,
    pub files_indexed: usize,
    pub lines_indexed: usize,
    pub duration_ms: u64,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub query: String,
    pub match_type: MatchType,
    /// Substring of the file path
    pub file_filter: Option<String>,
    /// Language name, mapped onto its file extensions
    pub language: Option<String>,
    pub max_results: Option<usize>,
    pub case_sensitive: bool,
    /// Extension allow-list, with or without a leading dot
    pub file_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file: String,
    pub line: usize,
    pub content: String,
    /// The string reported as matched
    pub match_text: String,
    pub context: String,
    /// Proximity heuristic for exact/structural, token overlap for semantic
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub match_type: MatchType,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    /// Whether this call had to build the line table first
    pub index_built: bool,
    pub duration_ms: u64,
}

/// Builds and queries the search store
pub struct SearchEngine {
    config: WorkspaceConfig,
    store: Option<SearchStore>,
}

impl SearchEngine {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.stores.search
    }

    fn store_mut(&mut self) -> Result<&mut SearchStore> {
        let store = match self.store.take() {
            Some(store) => store,
            None => SearchStore::open(&self.config.stores.search)?,
        };
        Ok(self.store.insert(store))
    }

    /// Build the line table when it holds no rows
    ///
    /// Returns the build result when a build ran.
    pub fn ensure_index(&mut self) -> Result<Option<BuildResult>> {
        if self.store_mut()?.line_count()? > 0 {
            return Ok(None);
        }
        debug!("Search store is empty, building");
        self.build_search_index(&BuildOptions::default()).map(Some)
    }

    /// Replace the line table with every line of every matched file
    pub fn build_search_index(&mut self, options: &BuildOptions) -> Result<BuildResult> {
        let started = Instant::now();
        let root = self.config.project_root.clone();
        ensure_directory(&root)?;

        let settings = &self.config.search;
        let include = options
            .include_patterns
            .clone()
            .unwrap_or_else(|| settings.include_patterns.clone());
        let exclude = options
            .exclude_patterns
            .clone()
            .unwrap_or_else(|| settings.exclude_patterns.clone());
        let matcher = PathMatcher::new(&include, &exclude)?;
        let limits = WalkLimits {
            max_file_size: self.config.indexing.max_file_size,
            max_files: self.config.indexing.max_files,
            max_depth: self.config.indexing.max_depth,
        };

        info!(root = ?root, "Building search index");

        let discovery = scan::discover(&root, &root, &matcher, &limits);
        let contents = scan::read_files(
            &discovery.files,
            self.config.indexing.parallel,
            self.config.indexing.worker_threads,
        );

        let project_path = root.to_string_lossy().into_owned();
        let indexed_at = Utc::now();
        let mut errors = discovery.errors;
        let mut lines = Vec::new();
        let mut files_indexed = 0;

        for (file, content) in discovery.files.iter().zip(contents) {
            let text = match content {
                Ok(content) => match content.text {
                    Some(text) => text,
                    None => {
                        debug!(path = %file.relative, "Skipping binary file");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(path = %file.relative, error = %e, "Failed to read file");
                    errors.push(FileError::new(&file.relative, format!("{:#}", e)));
                    continue;
                }
            };

            let style = file.language.comment_style();
            for (idx, line) in text.lines().enumerate() {
                lines.push(SearchLine {
                    project_path: project_path.clone(),
                    file_path: file.relative.clone(),
                    content_type: ContentType::classify(line, style),
                    content: line.to_string(),
                    line_number: idx + 1,
                    indexed_at,
                });
            }
            files_indexed += 1;
        }

        self.store_mut()?.replace_lines(&lines)?;

        let result = BuildResult {
            success: true,
            files_indexed,
            lines_indexed: lines.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        };

        info!(
            files = result.files_indexed,
            lines = result.lines_indexed,
            duration_ms = result.duration_ms,
            "Search index built"
        );

        Ok(result)
    }

    /// Answer a query from the line table, building it first if empty
    ///
    /// Every call with a non-empty query appends one history row.
    pub fn search(&mut self, options: &SearchOptions) -> Result<SearchResponse> {
        let started = Instant::now();
        let query = options.query.trim();
        if query.is_empty() {
            return Err(CoreError::EmptyQuery.into());
        }

        let index_built = self.ensure_index()?.is_some();
        let extensions = self.extension_filter(options);
        let max_results = options
            .max_results
            .unwrap_or(self.config.search.default_max_results);
        let radius = self.config.search.context_radius;

        let query_tokens = tokenize(query);
        let semantic = options.match_type == MatchType::Semantic && !query_tokens.is_empty();
        if options.match_type == MatchType::Semantic && !semantic {
            debug!(query, "Query has no usable tokens, matching exactly");
        }

        let store = self.store_mut()?;
        let rows = store.scan(&LineQuery {
            file_filter: options.file_filter.clone(),
            contains: if semantic { None } else { Some(query.to_string()) },
            case_sensitive: options.case_sensitive,
        })?;

        let rows = rows.into_iter().filter(|row| match &extensions {
            Some(allowed) => has_extension(&row.file_path, allowed),
            None => true,
        });

        let mut results = Vec::new();
        if semantic {
            for row in rows {
                if let Some(hit) = semantic_match(&row, &query_tokens, radius) {
                    results.push(hit);
                }
            }
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
            results.truncate(max_results);
        } else {
            let structural = options.match_type == MatchType::Structural;
            for row in rows {
                if results.len() >= max_results {
                    break;
                }
                if let Some(hit) =
                    literal_match(&row, query, structural, options.case_sensitive, radius)
                {
                    results.push(hit);
                }
            }
        }

        store.append_query(&QueryHistoryEntry {
            query: query.to_string(),
            result_count: results.len(),
            query_type: options.match_type.to_string(),
            searched_at: Utc::now(),
        })?;

        debug!(query, match_type = %options.match_type, hits = results.len(), "Search complete");

        Ok(SearchResponse {
            query: query.to_string(),
            match_type: options.match_type,
            total_results: results.len(),
            results,
            index_built,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Most recent queries first; empty when nothing has been searched
    pub fn query_history(&mut self, limit: Option<usize>) -> Result<Vec<QueryHistoryEntry>> {
        let limit = limit.unwrap_or(self.config.search.history_limit);
        if self.store.is_none() {
            self.store = SearchStore::open_existing(&self.config.stores.search)?;
        }
        match &self.store {
            Some(store) => store.recent_queries(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Combined language and file-type allow-list, lower-cased without dots
    fn extension_filter(&self, options: &SearchOptions) -> Option<Vec<String>> {
        let mut allowed: Option<Vec<String>> = None;

        if let Some(name) = options.language.as_deref() {
            match Language::from_name(name) {
                Language::Unknown => warn!(language = name, "Unknown language filter ignored"),
                language => {
                    allowed = Some(language.extensions().iter().map(|e| e.to_string()).collect())
                }
            }
        }

        if let Some(types) = &options.file_types {
            let types: Vec<String> = types
                .iter()
                .map(|t| t.trim().trim_start_matches('*').trim_start_matches('.').to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if !types.is_empty() {
                allowed = Some(match allowed {
                    Some(by_language) => by_language
                        .into_iter()
                        .filter(|e| types.contains(e))
                        .collect(),
                    None => types,
                });
            }
        }

        allowed
    }
}

fn has_extension(path: &str, allowed: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn literal_match(
    row: &SearchLine,
    query: &str,
    structural: bool,
    case_sensitive: bool,
    radius: usize,
) -> Option<SearchResult> {
    let mut match_text = query.to_string();
    if structural {
        if let Some(upgraded) = DECLARATION_KEYWORDS
            .iter()
            .map(|kw| format!("{} {}", kw, query))
            .find(|candidate| find_offset(&row.content, candidate, case_sensitive).is_some())
        {
            match_text = upgraded;
        }
    }

    let offset = find_offset(&row.content, &match_text, case_sensitive)?;
    let match_len = match_text.chars().count();

    Some(SearchResult {
        file: row.file_path.clone(),
        line: row.line_number,
        content: row.content.clone(),
        context: context_window(&row.content, offset, match_len, radius),
        score: proximity_score(offset, row.content.chars().count()),
        match_text,
    })
}

fn semantic_match(row: &SearchLine, query_tokens: &[String], radius: usize) -> Option<SearchResult> {
    let overlap = overlap_score(query_tokens, &row.content)?;
    let first = overlap.shared.first()?;
    let offset = find_offset(&row.content, first, false).unwrap_or(0);

    Some(SearchResult {
        file: row.file_path.clone(),
        line: row.line_number,
        content: row.content.clone(),
        context: context_window(&row.content, offset, first.chars().count(), radius),
        match_text: overlap.shared.join(" "),
        score: overlap.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str, content: &str| {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        };
        write(
            "src/app.js",
            "// load the user profile\nfunction loadProfile(user) {\n  return fetchProfile(user.id);\n}\nconst total = 1;\n",
        );
        write("src/tool.py", "# helper\ndef load_user(name):\n    return name\n");
        write("node_modules/dep/index.js", "function loadProfile() {}\n");
        dir
    }

    fn engine(dir: &tempfile::TempDir) -> SearchEngine {
        SearchEngine::new(WorkspaceConfig::for_project(dir.path()))
    }

    fn query(text: &str, match_type: MatchType) -> SearchOptions {
        SearchOptions {
            query: text.to_string(),
            match_type,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(ContentType::classify("  // note", CommentStyle::Slash), ContentType::Comment);
        assert_eq!(ContentType::classify(" * doc", CommentStyle::Slash), ContentType::Comment);
        assert_eq!(ContentType::classify("x = 1 # trailing", CommentStyle::Hash), ContentType::Code);
        assert_eq!(ContentType::classify("# Title", CommentStyle::None), ContentType::Code);
    }

    #[test]
    fn test_build_is_idempotent() {
        let dir = project();
        let mut engine = engine(&dir);

        let first = engine.build_search_index(&BuildOptions::default()).unwrap();
        let second = engine.build_search_index(&BuildOptions::default()).unwrap();

        assert_eq!(first.files_indexed, 2);
        assert_eq!(first.lines_indexed, 8);
        assert_eq!(first.lines_indexed, second.lines_indexed);
        assert_eq!(engine.store_mut().unwrap().line_count().unwrap(), 8);
    }

    #[test]
    fn test_exact_search_builds_lazily() {
        let dir = project();
        let mut engine = engine(&dir);

        let response = engine.search(&query("FETCHPROFILE", MatchType::Exact)).unwrap();
        assert!(response.index_built);
        assert_eq!(response.results.len(), 1);

        let hit = &response.results[0];
        assert_eq!(hit.file, "src/app.js");
        assert_eq!(hit.line, 3);
        assert_eq!(hit.match_text, "FETCHPROFILE");
        assert!(hit.score > 0.1 && hit.score < 1.0);

        let again = engine.search(&query("fetchProfile", MatchType::Exact)).unwrap();
        assert!(!again.index_built);
    }

    #[test]
    fn test_case_sensitive_search() {
        let dir = project();
        let mut engine = engine(&dir);
        let mut options = query("FETCHPROFILE", MatchType::Exact);
        options.case_sensitive = true;
        assert!(engine.search(&options).unwrap().results.is_empty());
    }

    #[test]
    fn test_structural_upgrade() {
        let dir = project();
        let mut engine = engine(&dir);

        let response = engine.search(&query("loadProfile", MatchType::Structural)).unwrap();
        let matches: Vec<_> = response.results.iter().map(|r| r.match_text.as_str()).collect();
        assert_eq!(matches, vec!["function loadProfile"]);
        assert_eq!(response.results[0].score, 1.0);

        let plain = engine.search(&query("total", MatchType::Structural)).unwrap();
        assert_eq!(plain.results[0].match_text, "const total");
    }

    #[test]
    fn test_semantic_ranks_by_overlap() {
        let dir = project();
        let mut engine = engine(&dir);

        let response = engine.search(&query("load user profile", MatchType::Semantic)).unwrap();
        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].line, 1);
        assert_eq!(response.results[0].score, 1.0);
        assert!(response
            .results
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_language_and_type_filters() {
        let dir = project();
        let mut engine = engine(&dir);

        let mut options = query("return", MatchType::Exact);
        options.language = Some("python".to_string());
        let response = engine.search(&options).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].file, "src/tool.py");

        let mut options = query("return", MatchType::Exact);
        options.file_types = Some(vec![".js".to_string()]);
        let response = engine.search(&options).unwrap();
        assert!(response.results.iter().all(|r| r.file.ends_with(".js")));

        let mut options = query("return", MatchType::Exact);
        options.language = Some("klingon".to_string());
        assert_eq!(engine.search(&options).unwrap().results.len(), 2);
    }

    #[test]
    fn test_history_records_every_search() {
        let dir = project();
        let mut engine = engine(&dir);

        engine.search(&query("total", MatchType::Exact)).unwrap();
        engine.search(&query("no such text anywhere", MatchType::Exact)).unwrap();
        assert!(engine.search(&query("   ", MatchType::Exact)).is_err());

        let history = engine.query_history(None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "no such text anywhere");
        assert_eq!(history[0].result_count, 0);
    }

    #[test]
    fn test_match_type_parse() {
        assert_eq!("Semantic".parse::<MatchType>().unwrap(), MatchType::Semantic);
        assert!("fuzzy".parse::<MatchType>().is_err());
    }
}
