//! Uniform request/response contract over the five components
//!
//! Every operation is a `ToolRequest` in and a `ToolResponse` out. Failures,
//! including panics inside a component, come back as `success: false`
//! responses instead of errors.

use crate::analysis::{AnalyzeOptions, Analyzer};
use crate::config::WorkspaceConfig;
use crate::fix::{FixOptions, Fixer};
use crate::indexer::{IndexOptions, Indexer};
use crate::search::{BuildOptions, SearchEngine, SearchOptions};
use crate::status::{StatusAggregator, StatusOptions};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Lines of detail listed under a summary headline
const SUMMARY_DETAIL_LIMIT: usize = 10;

/// An operation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ToolRequest {
    Index(IndexOptions),
    Structure,
    SearchProject {
        term: String,
    },
    BuildSearchIndex(BuildOptions),
    Search(SearchOptions),
    QueryHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    Analyze(AnalyzeOptions),
    Fix(FixOptions),
    FixHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    Status(StatusOptions),
}

impl ToolRequest {
    /// Operation name used in summaries and logs
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::Index(_) => "index",
            ToolRequest::Structure => "structure",
            ToolRequest::SearchProject { .. } => "search_project",
            ToolRequest::BuildSearchIndex(_) => "build_search_index",
            ToolRequest::Search(_) => "search",
            ToolRequest::QueryHistory { .. } => "query_history",
            ToolRequest::Analyze(_) => "analyze",
            ToolRequest::Fix(_) => "fix",
            ToolRequest::FixHistory { .. } => "fix_history",
            ToolRequest::Status(_) => "status",
        }
    }
}

/// Human-readable summary plus the component's native result as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    pub summary: String,
    pub metadata: serde_json::Value,
}

impl ToolResponse {
    fn ok(summary: String, metadata: serde_json::Value) -> Self {
        Self {
            success: true,
            summary,
            metadata,
        }
    }

    fn failure(op: &str, message: &str) -> Self {
        Self {
            success: false,
            summary: format!("{} failed: {}", op, message),
            metadata: json!({ "error": message }),
        }
    }
}

/// Owns one instance of each component for a project
///
/// Components are shared behind mutexes so concurrent calls against the same
/// store are serialized.
#[derive(Clone)]
pub struct Toolkit {
    indexer: Arc<Mutex<Indexer>>,
    search: Arc<Mutex<SearchEngine>>,
    analyzer: Arc<Mutex<Analyzer>>,
    fixer: Arc<Mutex<Fixer>>,
    status: Arc<StatusAggregator>,
}

impl Toolkit {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            indexer: Arc::new(Mutex::new(Indexer::new(config.clone()))),
            search: Arc::new(Mutex::new(SearchEngine::new(config.clone()))),
            analyzer: Arc::new(Mutex::new(Analyzer::new(config.clone()))),
            fixer: Arc::new(Mutex::new(Fixer::new(config.clone()))),
            status: Arc::new(StatusAggregator::new(config)),
        }
    }

    /// Run one request on the blocking pool
    pub async fn call(&self, request: ToolRequest) -> ToolResponse {
        let op = request.name();
        debug!(op, "Dispatching request");

        let toolkit = self.clone();
        match tokio::task::spawn_blocking(move || toolkit.dispatch(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(op, error = %e, "Operation failed");
                ToolResponse::failure(op, &format!("{:#}", e))
            }
            Err(e) => {
                warn!(op, error = %e, "Operation aborted");
                ToolResponse::failure(op, &e.to_string())
            }
        }
    }

    fn dispatch(&self, request: ToolRequest) -> Result<ToolResponse> {
        let response = match request {
            ToolRequest::Index(options) => {
                let result = lock(&self.indexer).index_project(&options);
                let mut summary = format!(
                    "Indexed {} files in {} folders ({} ms)",
                    result.files_indexed, result.folders_scanned, result.duration_ms
                );
                if !result.frameworks.is_empty() {
                    let _ = write!(summary, "\nFrameworks: {}", result.frameworks.join(", "));
                }
                for (language, count) in &result.languages {
                    let _ = write!(summary, "\n  {}: {}", language, count);
                }
                push_errors(&mut summary, &result.errors);
                ToolResponse {
                    success: result.success,
                    summary: if result.success {
                        summary
                    } else {
                        format!("index failed: {}", first_error(&result.errors))
                    },
                    metadata: serde_json::to_value(&result)?,
                }
            }

            ToolRequest::Structure => {
                let structure = lock(&self.indexer).get_project_structure()?;
                let summary = if structure.indexed {
                    format!(
                        "{} files in {} directories",
                        structure.files.len(),
                        structure.directories.len()
                    )
                } else {
                    "Project has not been indexed".to_string()
                };
                ToolResponse::ok(summary, serde_json::to_value(&structure)?)
            }

            ToolRequest::SearchProject { term } => {
                let result = lock(&self.indexer).search_project(&term)?;
                let mut summary = format!("{} matches for '{}'", result.matches.len(), result.term);
                for hit in result.matches.iter().take(SUMMARY_DETAIL_LIMIT) {
                    let _ = write!(summary, "\n  {}:{}: {}", hit.file, hit.line, hit.content.trim());
                }
                ToolResponse::ok(summary, serde_json::to_value(&result)?)
            }

            ToolRequest::BuildSearchIndex(options) => {
                let result = lock(&self.search).build_search_index(&options)?;
                let mut summary = format!(
                    "Indexed {} lines from {} files ({} ms)",
                    result.lines_indexed, result.files_indexed, result.duration_ms
                );
                push_errors(&mut summary, &result.errors);
                ToolResponse::ok(summary, serde_json::to_value(&result)?)
            }

            ToolRequest::Search(options) => {
                let response = lock(&self.search).search(&options)?;
                let mut summary = format!(
                    "Found {} results for '{}' ({})",
                    response.total_results, response.query, response.match_type
                );
                for hit in response.results.iter().take(SUMMARY_DETAIL_LIMIT) {
                    let _ = write!(summary, "\n  {}:{}: {}", hit.file, hit.line, hit.content.trim());
                }
                ToolResponse::ok(summary, serde_json::to_value(&response)?)
            }

            ToolRequest::QueryHistory { limit } => {
                let history = lock(&self.search).query_history(limit)?;
                let mut summary = format!("{} recent queries", history.len());
                for entry in &history {
                    let _ = write!(
                        summary,
                        "\n  {} [{}] {} results",
                        entry.query, entry.query_type, entry.result_count
                    );
                }
                ToolResponse::ok(summary, json!({ "queries": history }))
            }

            ToolRequest::Analyze(options) => {
                let result = lock(&self.analyzer).analyze(&options)?;
                let mut summary = format!(
                    "Analyzed {} files, found {} issues",
                    result.files_analyzed, result.issues_found
                );
                for issue in result.issues.iter().take(SUMMARY_DETAIL_LIMIT) {
                    let _ = write!(
                        summary,
                        "\n  {}:{} [{}] {}: {} ({})",
                        issue.file, issue.line, issue.severity, issue.rule, issue.message, issue.id
                    );
                }
                push_errors(&mut summary, &result.errors);
                ToolResponse::ok(summary, serde_json::to_value(&result)?)
            }

            ToolRequest::Fix(options) => {
                let result = lock(&self.fixer).fix_issues(&options)?;
                if !result.success {
                    ToolResponse {
                        success: false,
                        summary: format!("fix failed: {}", first_error(&result.errors)),
                        metadata: serde_json::to_value(&result)?,
                    }
                } else {
                    let verb = if result.dry_run { "Would fix" } else { "Fixed" };
                    let mut summary = format!(
                        "{} {} issues in {} files, {} skipped",
                        verb,
                        result.issues_fixed,
                        result.files_fixed,
                        result.skipped.len()
                    );
                    for skipped in result.skipped.iter().take(SUMMARY_DETAIL_LIMIT) {
                        let _ = write!(
                            summary,
                            "\n  skipped {}:{} {}: {}",
                            skipped.file, skipped.line, skipped.rule, skipped.reason
                        );
                    }
                    for preview in &result.previews {
                        let _ = write!(summary, "\n{}", preview.diff.trim_end());
                    }
                    push_errors(&mut summary, &result.errors);
                    ToolResponse::ok(summary, serde_json::to_value(&result)?)
                }
            }

            ToolRequest::FixHistory { limit } => {
                let history = lock(&self.fixer).get_fix_history(limit)?;
                let mut summary = format!(
                    "{} fixes across {} runs",
                    history.summary.total_fixes, history.summary.total_runs
                );
                for (rule, count) in &history.summary.by_rule {
                    let _ = write!(summary, "\n  {}: {}", rule, count);
                }
                ToolResponse::ok(summary, serde_json::to_value(&history)?)
            }

            ToolRequest::Status(options) => {
                let status = self.status.status(&options)?;
                let presence = |exists: bool| if exists { "present" } else { "missing" };
                let mut summary = format!(
                    "index: {} ({} files)\nsearch: {} ({} lines)\nanalysis: {} ({} issues)\nfixes: {} ({} applied)",
                    presence(status.index.store.exists),
                    status.index.file_count,
                    presence(status.search.store.exists),
                    status.search.line_count,
                    presence(status.analysis.store.exists),
                    status.analysis.total_issues,
                    presence(status.fixes.store.exists),
                    status.fixes.total_fixes,
                );
                if let Some(bytes) = status.memory.resident_bytes {
                    let _ = write!(summary, "\nmemory: {:.1} MiB", bytes as f64 / (1024.0 * 1024.0));
                }
                for recommendation in &status.recommendations {
                    let _ = write!(summary, "\n- {}", recommendation);
                }
                ToolResponse::ok(summary, serde_json::to_value(&status)?)
            }
        };

        Ok(response)
    }
}

/// A panic in an earlier call must not disable the component
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push_errors(summary: &mut String, errors: &[crate::error::FileError]) {
    if errors.is_empty() {
        return;
    }
    let _ = write!(summary, "\n{} errors", errors.len());
    for error in errors.iter().take(SUMMARY_DETAIL_LIMIT) {
        let _ = write!(summary, "\n  {}", error);
    }
}

fn first_error(errors: &[crate::error::FileError]) -> String {
    errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> (tempfile::TempDir, Toolkit) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/app.js"),
            "const limit = 10;\nif (count == limit) {\n  console.log(count);\n}\n",
        )
        .unwrap();
        let toolkit = Toolkit::new(WorkspaceConfig::for_project(dir.path()));
        (dir, toolkit)
    }

    #[test]
    fn test_request_wire_format() {
        let request: ToolRequest =
            serde_json::from_str(r#"{"op": "search", "query": "limit", "matchType": "semantic"}"#)
                .unwrap();
        match request {
            ToolRequest::Search(options) => {
                assert_eq!(options.query, "limit");
                assert_eq!(options.match_type, crate::search::MatchType::Semantic);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let request: ToolRequest = serde_json::from_str(r#"{"op": "fix_history"}"#).unwrap();
        assert!(matches!(request, ToolRequest::FixHistory { limit: None }));

        let request: ToolRequest =
            serde_json::from_str(r#"{"op": "fix", "dryRun": true}"#).unwrap();
        assert_eq!(request.name(), "fix");
    }

    #[tokio::test]
    async fn test_validation_error_becomes_failure() {
        let (_dir, toolkit) = project();
        let response = toolkit
            .call(ToolRequest::Search(SearchOptions::default()))
            .await;
        assert!(!response.success);
        assert!(response.summary.starts_with("search failed: "));
        assert!(response.metadata["error"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_search_and_analyze() {
        let (_dir, toolkit) = project();

        let response = toolkit
            .call(ToolRequest::Search(SearchOptions {
                query: "count == limit".to_string(),
                ..Default::default()
            }))
            .await;
        assert!(response.success);
        assert_eq!(response.metadata["totalResults"], 1);
        assert_eq!(response.metadata["results"][0]["line"], 2);
        assert_eq!(response.metadata["indexBuilt"], true);

        let response = toolkit
            .call(ToolRequest::Analyze(AnalyzeOptions::default()))
            .await;
        assert!(response.success);
        assert_eq!(response.metadata["issuesFound"], 2);
        assert!(response.summary.contains("eqeqeq"));
    }

    #[tokio::test]
    async fn test_fix_without_analysis() {
        let (_dir, toolkit) = project();
        let response = toolkit.call(ToolRequest::Fix(FixOptions::default())).await;
        assert!(!response.success);
        assert!(response.summary.starts_with("fix failed: "));
    }

    #[tokio::test]
    async fn test_status_summary() {
        let (_dir, toolkit) = project();
        let response = toolkit
            .call(ToolRequest::Status(StatusOptions::default()))
            .await;
        assert!(response.success);
        assert!(response.summary.contains("index: missing"));
        assert_eq!(response.metadata["index"]["exists"], false);
    }
}
