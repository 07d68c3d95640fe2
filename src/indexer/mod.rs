//! Project indexer
//!
//! Walks a project tree and records one row per file with its language,
//! size, line count and content hash. Every `index_project` call is a full
//! rebuild; there is no resumable state.

mod dependencies;
mod frameworks;

pub use dependencies::extract_dependencies;
pub use frameworks::{detect_in_manifest, is_manifest};

use crate::config::WorkspaceConfig;
use crate::error::{ensure_directory, CoreError, FileError};
use crate::scan::{self, PathMatcher, WalkLimits};
use crate::search::tokenize;
use crate::storage::{IndexSnapshot, IndexStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of keywords kept per file when semantic augmentation is on
const KEYWORDS_PER_FILE: usize = 16;

/// Cap on `search_project` hits
const PROJECT_SEARCH_LIMIT: usize = 100;

/// One indexed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Path relative to the project root
    pub path: String,
    pub size: u64,
    pub language: String,
    pub line_count: usize,
    /// SHA-256 of the file bytes
    pub content_hash: String,
    /// Most frequent tokens, present when semantic augmentation was enabled
    pub keywords: Option<Vec<String>>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub path: String,
    pub depth: usize,
}

/// A reference from one file to a module, package or header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub source: String,
    pub target: String,
    pub kind: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkHit {
    pub name: String,
    pub evidence: String,
}

/// A recorded build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRun {
    pub project_path: String,
    pub files_indexed: usize,
    pub folders_scanned: usize,
    pub status: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Terminal state of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStatus::Completed => write!(f, "completed"),
            IndexStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Options for `index_project`; unset fields take the workspace defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexOptions {
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub max_file_size: Option<u64>,
    pub max_files: Option<usize>,
    pub max_depth: Option<usize>,
    /// Store a keyword signature per file
    pub enable_vectors: bool,
    /// Record import/use/include references
    pub analyze_dependencies: bool,
    pub parallel: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    pub success: bool,
    pub files_indexed: usize,
    pub folders_scanned: usize,
    pub duration_ms: u64,
    pub database_path: PathBuf,
    pub status: IndexStatus,
    pub languages: BTreeMap<String, usize>,
    pub frameworks: Vec<String>,
    pub dependencies_found: usize,
    pub skipped_files: usize,
    pub truncated: bool,
    pub errors: Vec<FileError>,
}

/// Last-built snapshot of the project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    pub indexed: bool,
    pub files: Vec<FileRecord>,
    pub directories: Vec<String>,
    pub languages: BTreeMap<String, usize>,
    pub frameworks: Vec<FrameworkHit>,
    pub dependencies: Vec<DependencyRef>,
    pub last_run: Option<IndexRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMatch {
    pub file: String,
    /// 1-based line number, or 0 for a keyword-only hit
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSearchResult {
    pub term: String,
    pub matches: Vec<ProjectMatch>,
    pub truncated: bool,
    pub errors: Vec<FileError>,
}

/// Builds and reads the index store
pub struct Indexer {
    config: WorkspaceConfig,
    store: Option<IndexStore>,
}

impl Indexer {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.stores.index
    }

    /// Index the project tree, replacing any previous build
    ///
    /// Never fails: problems surface as `status: failed` or in `errors`.
    pub fn index_project(&mut self, options: &IndexOptions) -> IndexResult {
        let started = Instant::now();
        let started_at = Utc::now();

        match self.build(options, started, started_at) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Index build failed");
                let result = IndexResult {
                    success: false,
                    files_indexed: 0,
                    folders_scanned: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    database_path: self.config.stores.index.clone(),
                    status: IndexStatus::Failed,
                    languages: BTreeMap::new(),
                    frameworks: Vec::new(),
                    dependencies_found: 0,
                    skipped_files: 0,
                    truncated: false,
                    errors: vec![FileError::new(
                        self.config.project_root.to_string_lossy(),
                        format!("{:#}", e),
                    )],
                };
                if let Some(store) = &self.store {
                    if let Err(e) = store.record_run(&self.run_for(&result, started_at)) {
                        warn!(error = %e, "Failed to record index run");
                    }
                }
                result
            }
        }
    }

    fn build(
        &mut self,
        options: &IndexOptions,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> Result<IndexResult> {
        let root = self.config.project_root.clone();
        ensure_directory(&root)?;

        let settings = &self.config.indexing;
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
            max_file_size: options.max_file_size.unwrap_or(settings.max_file_size),
            max_files: options.max_files.unwrap_or(settings.max_files),
            max_depth: options.max_depth.unwrap_or(settings.max_depth),
        };
        let parallel = options.parallel.unwrap_or(settings.parallel);

        info!(root = ?root, parallel, "Indexing project");

        let discovery = scan::discover(&root, &root, &matcher, &limits);
        let contents = scan::read_files(&discovery.files, parallel, settings.worker_threads);

        let mut snapshot = IndexSnapshot::default();
        let mut errors = discovery.errors;

        for (file, content) in discovery.files.iter().zip(contents) {
            let content = match content {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %file.relative, error = %e, "Failed to read file");
                    errors.push(FileError::new(&file.relative, format!("{:#}", e)));
                    continue;
                }
            };

            let text = content.text.as_deref().unwrap_or_default();
            let keywords = if options.enable_vectors && content.text.is_some() {
                Some(keyword_signature(text))
            } else {
                None
            };

            if options.analyze_dependencies {
                snapshot
                    .dependencies
                    .extend(extract_dependencies(&file.relative, file.language, text));
            }

            if is_manifest(&file.relative) {
                for hit in detect_in_manifest(&file.relative, text) {
                    if !snapshot.frameworks.iter().any(|f| f.name == hit.name) {
                        snapshot.frameworks.push(hit);
                    }
                }
            }

            debug!(path = %file.relative, language = %file.language, "Indexed file");
            snapshot.files.push(FileRecord {
                path: file.relative.clone(),
                size: file.size,
                language: file.language.to_string(),
                line_count: text.lines().count(),
                content_hash: content.hash,
                keywords,
                indexed_at: Utc::now(),
            });
        }

        snapshot.folders = discovery
            .folders
            .iter()
            .map(|f| FolderRecord {
                path: f.relative.clone(),
                depth: f.depth,
            })
            .collect();

        if self.store.is_none() {
            self.store = Some(IndexStore::open(&self.config.stores.index)?);
        }
        if let Some(store) = self.store.as_mut() {
            store.replace_snapshot(&snapshot)?;
        }

        let mut languages = BTreeMap::new();
        for file in &snapshot.files {
            *languages.entry(file.language.clone()).or_insert(0) += 1;
        }

        let result = IndexResult {
            success: true,
            files_indexed: snapshot.files.len(),
            folders_scanned: snapshot.folders.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            database_path: self.config.stores.index.clone(),
            status: IndexStatus::Completed,
            languages,
            frameworks: snapshot.frameworks.iter().map(|f| f.name.clone()).collect(),
            dependencies_found: snapshot.dependencies.len(),
            skipped_files: discovery.skipped_large,
            truncated: discovery.truncated,
            errors,
        };

        let run = self.run_for(&result, started_at);
        if let Some(store) = &self.store {
            store.record_run(&run)?;
        }

        info!(
            files = result.files_indexed,
            folders = result.folders_scanned,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "Index build complete"
        );

        Ok(result)
    }

    fn run_for(&self, result: &IndexResult, started_at: DateTime<Utc>) -> IndexRun {
        IndexRun {
            project_path: self.config.project_root.to_string_lossy().into_owned(),
            files_indexed: result.files_indexed,
            folders_scanned: result.folders_scanned,
            status: result.status.to_string(),
            duration_ms: result.duration_ms,
            started_at,
        }
    }

    /// Reuse the open store, or open an existing one without creating it
    fn existing_store(&mut self) -> Result<Option<&IndexStore>> {
        if self.store.is_none() {
            self.store = IndexStore::open_existing(&self.config.stores.index)?;
        }
        Ok(self.store.as_ref())
    }

    /// Snapshot from the last build; empty when nothing has been indexed
    pub fn get_project_structure(&mut self) -> Result<ProjectStructure> {
        let Some(store) = self.existing_store()? else {
            return Ok(ProjectStructure::default());
        };

        Ok(ProjectStructure {
            indexed: true,
            files: store.files()?,
            directories: store.folders()?.into_iter().map(|f| f.path).collect(),
            languages: store.language_histogram()?,
            frameworks: store.frameworks()?,
            dependencies: store.dependencies()?,
            last_run: store.last_run()?,
        })
    }

    /// Case-insensitive substring scan over the contents of indexed files
    pub fn search_project(&mut self, term: &str) -> Result<ProjectSearchResult> {
        let term = term.trim();
        if term.is_empty() {
            return Err(CoreError::EmptyQuery.into());
        }
        let needle = term.to_lowercase();
        let root = self.config.project_root.clone();

        let files = match self.existing_store()? {
            Some(store) => store.files()?,
            None => Vec::new(),
        };

        let mut result = ProjectSearchResult {
            term: term.to_string(),
            matches: Vec::new(),
            truncated: false,
            errors: Vec::new(),
        };

        'files: for file in &files {
            let path = root.join(&file.path);
            let content = match scan::read_file(&path) {
                Ok(content) => content,
                Err(e) => {
                    result.errors.push(FileError::new(&file.path, format!("{:#}", e)));
                    continue;
                }
            };

            let mut line_hit = false;
            if let Some(text) = content.text.as_deref() {
                for (idx, line) in text.lines().enumerate() {
                    if line.to_lowercase().contains(&needle) {
                        line_hit = true;
                        if result.matches.len() >= PROJECT_SEARCH_LIMIT {
                            result.truncated = true;
                            break 'files;
                        }
                        result.matches.push(ProjectMatch {
                            file: file.path.clone(),
                            line: idx + 1,
                            content: line.trim().to_string(),
                        });
                    }
                }
            }

            let keyword_hit = file
                .keywords
                .as_ref()
                .map(|k| k.iter().any(|w| w.contains(&needle)))
                .unwrap_or(false);
            if keyword_hit && !line_hit {
                if result.matches.len() >= PROJECT_SEARCH_LIMIT {
                    result.truncated = true;
                    break;
                }
                result.matches.push(ProjectMatch {
                    file: file.path.clone(),
                    line: 0,
                    content: format!("keywords: {}", file.keywords.as_deref().unwrap_or_default().join(" ")),
                });
            }
        }

        debug!(term, hits = result.matches.len(), "Project search complete");
        Ok(result)
    }
}

/// Most frequent tokens of a file, ties broken alphabetically
fn keyword_signature(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(KEYWORDS_PER_FILE)
        .map(|(token, _)| token)
        .collect()
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
        write("package.json", r#"{"dependencies": {"express": "4"}}"#);
        write("src/server.js", "const express = require('express');\nconst app = express();\n");
        write("src/util.py", "import os\n\ndef helper():\n    return os.getcwd()\n");
        write("node_modules/express/index.js", "module.exports = {};\n");
        write("big.txt", &"x".repeat(4096));
        dir
    }

    #[test]
    fn test_index_project() {
        let dir = project();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path()));

        let result = indexer.index_project(&IndexOptions {
            max_file_size: Some(1024),
            analyze_dependencies: true,
            ..Default::default()
        });

        assert!(result.success);
        assert_eq!(result.status, IndexStatus::Completed);
        assert_eq!(result.files_indexed, 3);
        assert_eq!(result.skipped_files, 1);
        assert_eq!(result.languages.get("javascript"), Some(&1));
        assert_eq!(result.languages.get("python"), Some(&1));
        assert_eq!(result.frameworks, vec!["Express"]);
        assert_eq!(result.dependencies_found, 2);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_rebuild_replaces_rows() {
        let dir = project();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path()));
        indexer.index_project(&IndexOptions::default());

        std::fs::remove_file(dir.path().join("src/util.py")).unwrap();
        let result = indexer.index_project(&IndexOptions::default());
        let structure = indexer.get_project_structure().unwrap();

        assert_eq!(structure.files.len(), result.files_indexed);
        assert!(structure.files.iter().all(|f| f.path != "src/util.py"));
        assert_eq!(structure.directories, vec!["src"]);
        assert!(structure.last_run.is_some());
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path().join("missing")));
        let result = indexer.index_project(&IndexOptions::default());

        assert!(!result.success);
        assert_eq!(result.status, IndexStatus::Failed);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_failed_build_is_recorded() {
        let dir = project();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path()));
        assert!(indexer.index_project(&IndexOptions::default()).success);

        let result = indexer.index_project(&IndexOptions {
            exclude_patterns: Some(vec!["[".to_string()]),
            ..Default::default()
        });
        assert_eq!(result.status, IndexStatus::Failed);

        let last_run = indexer.get_project_structure().unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "failed");
        assert_eq!(last_run.files_indexed, 0);
    }

    #[test]
    fn test_structure_before_indexing() {
        let dir = project();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path()));
        let structure = indexer.get_project_structure().unwrap();
        assert!(!structure.indexed);
        assert!(!dir.path().join(".codewarden/index.db").exists());
    }

    #[test]
    fn test_search_project() {
        let dir = project();
        let mut indexer = Indexer::new(WorkspaceConfig::for_project(dir.path()));
        indexer.index_project(&IndexOptions {
            enable_vectors: true,
            ..Default::default()
        });

        let result = indexer.search_project("GETCWD").unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].file, "src/util.py");
        assert_eq!(result.matches[0].line, 4);

        assert!(indexer.search_project("  ").is_err());
    }

    #[test]
    fn test_keyword_signature() {
        let keywords = keyword_signature("alpha beta beta gamma gamma gamma an");
        assert_eq!(keywords, vec!["gamma", "beta", "alpha"]);
    }
}
