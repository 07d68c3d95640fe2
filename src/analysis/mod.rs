//! Pattern-based code analysis
//!
//! The analyzer walks the project (or a sub-path of it), builds a
//! `SourceModel` per file and runs the rule catalogue over every line. Issue
//! ids are derived from (file, line, rule), so analyzing an unchanged file
//! twice yields the same ids and the store is updated in place.

pub mod model;
pub mod rules;

pub use model::{Declaration, DeclarationKind, LineKind, ModelLine, SourceModel, SourceParser};
pub use rules::{Rule, RuleMatch, RuleSet};

use crate::config::WorkspaceConfig;
use crate::error::{ensure_directory, CoreError, FileError};
use crate::scan::{self, content_hash, Language, PathMatcher, WalkLimits};
use crate::storage::AnalysisStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Category of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    CodeSmell,
    Bug,
    Maintainability,
    Style,
}

impl IssueType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "bug" => IssueType::Bug,
            "maintainability" => IssueType::Maintainability,
            "style" => IssueType::Style,
            _ => IssueType::CodeSmell,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueType::CodeSmell => write!(f, "code-smell"),
            IssueType::Bug => write!(f, "bug"),
            IssueType::Maintainability => write!(f, "maintainability"),
            IssueType::Style => write!(f, "style"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_name(name: &str) -> Self {
        match name {
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// A single (file, line, rule) finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisIssue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    /// Path relative to the project root
    pub file: String,
    pub line: usize,
    pub column: Option<usize>,
    pub message: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub rule: String,
    pub created_at: DateTime<Utc>,
}

/// Stable id of a finding: first 16 hex chars of SHA-256 over `file:line:rule`
pub fn issue_id(file: &str, line: usize, rule: &str) -> String {
    let mut id = content_hash(format!("{}:{}:{}", file, line, rule).as_bytes());
    id.truncate(16);
    id
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    /// File or directory to analyze, relative to the project root
    pub path: Option<String>,
    /// Accepted and echoed back; rule selection comes from `disabled_rules`
    pub ruleset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    pub files_analyzed: usize,
    pub issues_found: usize,
    pub issues: Vec<AnalysisIssue>,
    pub ruleset: Option<String>,
    pub rules: Vec<String>,
    pub duration_ms: u64,
    pub errors: Vec<FileError>,
}

/// Runs the rule catalogue and owns the analysis store
pub struct Analyzer {
    config: WorkspaceConfig,
    rules: RuleSet,
    store: Option<AnalysisStore>,
}

impl Analyzer {
    pub fn new(config: WorkspaceConfig) -> Self {
        let rules = RuleSet::enabled(&config.analysis);
        Self {
            config,
            rules,
            store: None,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.stores.analysis
    }

    fn store_mut(&mut self) -> Result<&mut AnalysisStore> {
        let store = match self.store.take() {
            Some(store) => store,
            None => AnalysisStore::open(&self.config.stores.analysis)?,
        };
        Ok(self.store.insert(store))
    }

    pub fn analyze(&mut self, options: &AnalyzeOptions) -> Result<AnalysisResult> {
        let started = Instant::now();
        let root = self.config.project_root.clone();
        ensure_directory(&root)?;

        let target = match options.path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() && path != "." => root.join(path),
            _ => root.clone(),
        };
        if !target.exists() {
            return Err(CoreError::InvalidPath(target).into());
        }

        // The scope must resolve inside the project; rebuild it from the root
        // so file paths never carry `..`
        let canonical_root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", root))?;
        let canonical_target = target
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", target))?;
        let target = match canonical_target.strip_prefix(&canonical_root) {
            Ok(inside) if inside.as_os_str().is_empty() => root.clone(),
            Ok(inside) => root.join(inside),
            Err(_) => return Err(CoreError::InvalidPath(target).into()),
        };
        let scope = self.config.relative_path(&target);

        let settings = &self.config.analysis;
        let matcher = PathMatcher::new(&settings.include_patterns, &settings.exclude_patterns)?;
        let limits = WalkLimits {
            max_file_size: self.config.indexing.max_file_size,
            max_files: self.config.indexing.max_files,
            max_depth: self.config.indexing.max_depth,
        };

        info!(scope = %scope, ruleset = ?options.ruleset, "Analyzing project");

        let mut discovery = scan::discover(&root, &target, &matcher, &limits);
        discovery.files.retain(|f| f.language.is_source());
        let contents = scan::read_files(
            &discovery.files,
            self.config.indexing.parallel,
            self.config.indexing.worker_threads,
        );

        let mut errors = discovery.errors;
        let mut by_file: BTreeMap<String, Vec<AnalysisIssue>> = BTreeMap::new();

        for (file, content) in discovery.files.iter().zip(contents) {
            let text = match content {
                Ok(content) => match content.text {
                    Some(text) => text,
                    None => continue,
                },
                Err(e) => {
                    warn!(path = %file.relative, error = %e, "Failed to read file");
                    errors.push(FileError::new(&file.relative, format!("{:#}", e)));
                    continue;
                }
            };

            let issues = detect(&self.rules, &file.relative, file.language, &text);
            debug!(path = %file.relative, issues = issues.len(), "Analyzed file");
            by_file.insert(file.relative.clone(), issues);
        }

        let scope_filter = if scope.is_empty() { None } else { Some(scope.as_str()) };
        self.store_mut()?.sync(scope_filter, &by_file)?;

        let files_analyzed = by_file.len();
        let issues: Vec<AnalysisIssue> = by_file.into_values().flatten().collect();

        let result = AnalysisResult {
            success: true,
            files_analyzed,
            issues_found: issues.len(),
            issues,
            ruleset: options.ruleset.clone(),
            rules: self.rules.ids().into_iter().map(str::to_string).collect(),
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        };

        info!(
            files = result.files_analyzed,
            issues = result.issues_found,
            duration_ms = result.duration_ms,
            "Analysis complete"
        );

        Ok(result)
    }
}

/// Run every applicable rule over one file
pub fn detect(rules: &RuleSet, file: &str, language: Language, text: &str) -> Vec<AnalysisIssue> {
    let model = SourceModel::parse(language, text);
    let now = Utc::now();
    let mut issues = Vec::new();

    for line in &model.lines {
        if line.kind == LineKind::Blank {
            continue;
        }
        for rule in rules.iter().filter(|r| r.applies_to(language)) {
            let Some(found) = rule.check(&model, line) else {
                continue;
            };
            issues.push(AnalysisIssue {
                id: issue_id(file, line.number, rule.id()),
                issue_type: rule.issue_type(),
                severity: rule.severity(),
                file: file.to_string(),
                line: line.number,
                column: Some(found.column),
                message: found.message,
                description: rule.description(),
                suggestion: rule.suggestion().map(str::to_string),
                rule: rule.id().to_string(),
                created_at: now,
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "function greet(name: any) {\n  console.log(\"hello \" + name);\n  if (name == \"admin\") {\n    return true; // TODO roles\n  }\n  return false;\n}\n";

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str, content: &str| {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        };
        write("src/greet.ts", SAMPLE);
        write("lib/util.py", "from os import *\n");
        write("README.md", "# TODO: write docs\n");
        dir
    }

    fn rules_of(result: &AnalysisResult) -> Vec<(String, usize, String)> {
        result
            .issues
            .iter()
            .map(|i| (i.file.clone(), i.line, i.rule.clone()))
            .collect()
    }

    #[test]
    fn test_issue_id_is_stable() {
        assert_eq!(issue_id("a.js", 3, "eqeqeq"), issue_id("a.js", 3, "eqeqeq"));
        assert_ne!(issue_id("a.js", 3, "eqeqeq"), issue_id("a.js", 4, "eqeqeq"));
        assert_eq!(issue_id("a.js", 3, "eqeqeq").len(), 16);
    }

    #[test]
    fn test_analyze_project() {
        let dir = project();
        let mut analyzer = Analyzer::new(WorkspaceConfig::for_project(dir.path()));
        let result = analyzer.analyze(&AnalyzeOptions::default()).unwrap();

        assert!(result.success);
        assert_eq!(result.files_analyzed, 2);
        assert_eq!(
            rules_of(&result),
            vec![
                ("lib/util.py".to_string(), 1, "no-wildcard-import".to_string()),
                ("src/greet.ts".to_string(), 1, "no-explicit-any".to_string()),
                ("src/greet.ts".to_string(), 2, "no-console".to_string()),
                ("src/greet.ts".to_string(), 3, "eqeqeq".to_string()),
                ("src/greet.ts".to_string(), 4, "todo-comment".to_string()),
            ]
        );
        assert_eq!(result.issues[1].issue_type, IssueType::Maintainability);
        assert_eq!(result.issues[3].severity, Severity::High);
    }

    #[test]
    fn test_reanalysis_upserts() {
        let dir = project();
        let mut analyzer = Analyzer::new(WorkspaceConfig::for_project(dir.path()));
        let first = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        let second = analyzer.analyze(&AnalyzeOptions::default()).unwrap();

        let ids = |r: &AnalysisResult| r.issues.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(analyzer.store_mut().unwrap().count().unwrap(), 5);

        std::fs::write(dir.path().join("src/greet.ts"), "export const x = 1;\n").unwrap();
        analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(analyzer.store_mut().unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_scoped_analysis_leaves_other_files() {
        let dir = project();
        let mut analyzer = Analyzer::new(WorkspaceConfig::for_project(dir.path()));
        analyzer.analyze(&AnalyzeOptions::default()).unwrap();

        let scoped = analyzer
            .analyze(&AnalyzeOptions {
                path: Some("lib".to_string()),
                ruleset: Some("recommended".to_string()),
            })
            .unwrap();
        assert_eq!(scoped.files_analyzed, 1);
        assert_eq!(scoped.ruleset.as_deref(), Some("recommended"));
        assert_eq!(analyzer.store_mut().unwrap().count().unwrap(), 5);

        let single = analyzer
            .analyze(&AnalyzeOptions {
                path: Some("src/greet.ts".to_string()),
                ruleset: None,
            })
            .unwrap();
        assert_eq!(single.issues_found, 4);

        assert!(analyzer
            .analyze(&AnalyzeOptions {
                path: Some("missing".to_string()),
                ruleset: None,
            })
            .is_err());
    }

    #[test]
    fn test_scope_must_stay_inside_project() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("project");
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::create_dir_all(outer.path().join("sibling")).unwrap();
        std::fs::write(root.join("lib/util.py"), "from os import *\n").unwrap();
        std::fs::write(outer.path().join("sibling/victim.js"), "if (a == b) {}\n").unwrap();

        let config = WorkspaceConfig::for_project(&root);
        let mut analyzer = Analyzer::new(config.clone());
        let err = analyzer
            .analyze(&AnalyzeOptions {
                path: Some("../sibling".to_string()),
                ruleset: None,
            })
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::InvalidPath(_))));
        assert!(!config.stores.analysis.exists());

        let normalized = analyzer
            .analyze(&AnalyzeOptions {
                path: Some("lib/../lib".to_string()),
                ruleset: None,
            })
            .unwrap();
        assert_eq!(normalized.issues.len(), 1);
        assert_eq!(normalized.issues[0].file, "lib/util.py");
    }

    #[test]
    fn test_disabled_rules_do_not_fire() {
        let dir = project();
        let mut config = WorkspaceConfig::for_project(dir.path());
        config.analysis.disabled_rules = vec!["todo-comment".to_string(), "no-wildcard-import".to_string()];
        let mut analyzer = Analyzer::new(config);

        let result = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(result.issues_found, 3);
        assert!(!result.rules.contains(&"todo-comment".to_string()));
    }
}
