//! Automatic fixes for analysis issues
//!
//! Issues are read from the analysis store and grouped by file. For every
//! file the flagging rule is asked again, against the file as it is now, for
//! the span edits that resolve its finding. Edits for one file are applied
//! together, back-to-front, so all its fixes land in a single write.
//!
//! In apply mode the original bytes are copied to
//! `<backup_dir>/<run_id>/<relative path>` before the file is rewritten, and
//! one history row is recorded per resolved issue. Dry-run computes the same
//! edits and returns a diff preview without touching anything.

mod edits;

pub use edits::{apply_edits, Edit};

use crate::analysis::{AnalysisIssue, RuleSet, SourceModel};
use crate::config::WorkspaceConfig;
use crate::error::FileError;
use crate::scan::Language;
use crate::storage::{AnalysisStore, FixStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of history rows returned when no limit is given
const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixOptions {
    /// Fix only these issues; all stored issues when unset
    pub issue_ids: Option<Vec<String>>,
    pub dry_run: bool,
}

/// One resolved issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
    pub run_id: String,
    pub issue_id: String,
    pub file: String,
    pub rule: String,
    pub backup_created: bool,
    pub backup_path: Option<String>,
    pub success: bool,
    pub fixed_at: DateTime<Utc>,
}

/// An issue left alone, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedIssue {
    pub issue_id: String,
    pub file: String,
    pub line: usize,
    pub rule: String,
    pub reason: String,
}

/// Unified diff of what a dry run would change in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePreview {
    pub file: String,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResult {
    pub success: bool,
    pub dry_run: bool,
    pub run_id: String,
    pub files_fixed: usize,
    pub issues_fixed: usize,
    pub duration_ms: u64,
    pub fixes: Vec<FixRecord>,
    pub skipped: Vec<SkippedIssue>,
    pub previews: Vec<FilePreview>,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixHistorySummary {
    pub total_fixes: usize,
    pub total_runs: usize,
    pub average_per_run: f64,
    pub last_fix_at: Option<DateTime<Utc>>,
    pub by_rule: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixHistory {
    pub records: Vec<FixRecord>,
    pub summary: FixHistorySummary,
}

/// What happened to one file
struct FileOutcome {
    fixed: Vec<AnalysisIssue>,
    skipped: Vec<SkippedIssue>,
    preview: Option<String>,
    backup: Option<PathBuf>,
}

/// Applies fixes and owns the fixes store
pub struct Fixer {
    config: WorkspaceConfig,
    rules: RuleSet,
    store: Option<FixStore>,
}

impl Fixer {
    pub fn new(config: WorkspaceConfig) -> Self {
        // Every rule, so issues from rules disabled later can still be fixed
        let rules = RuleSet::new(&config.analysis);
        Self {
            config,
            rules,
            store: None,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.stores.fixes
    }

    fn store_mut(&mut self) -> Result<&mut FixStore> {
        let store = match self.store.take() {
            Some(store) => store,
            None => FixStore::open(&self.config.stores.fixes)?,
        };
        Ok(self.store.insert(store))
    }

    pub fn fix_issues(&mut self, options: &FixOptions) -> Result<FixResult> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut result = FixResult {
            success: true,
            dry_run: options.dry_run,
            run_id: run_id.clone(),
            files_fixed: 0,
            issues_fixed: 0,
            duration_ms: 0,
            fixes: Vec::new(),
            skipped: Vec::new(),
            previews: Vec::new(),
            errors: Vec::new(),
        };

        let analysis_path = &self.config.stores.analysis;
        let Some(analysis) = AnalysisStore::open_existing(analysis_path)? else {
            warn!(path = ?analysis_path, "No analysis results to fix");
            result.success = false;
            result.errors.push(FileError::new(
                analysis_path.to_string_lossy(),
                "No analysis results found; run analysis first",
            ));
            result.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(result);
        };

        let issues = match &options.issue_ids {
            Some(ids) => {
                let found = analysis.issues_by_ids(ids)?;
                let known: HashSet<&str> = found.iter().map(|i| i.id.as_str()).collect();
                for id in ids.iter().filter(|id| !known.contains(id.as_str())) {
                    result.skipped.push(SkippedIssue {
                        issue_id: id.clone(),
                        file: String::new(),
                        line: 0,
                        rule: String::new(),
                        reason: "Issue not found".to_string(),
                    });
                }
                found
            }
            None => analysis.all_issues()?,
        };
        drop(analysis);

        let mut by_file: BTreeMap<String, Vec<AnalysisIssue>> = BTreeMap::new();
        for issue in issues {
            by_file.entry(issue.file.clone()).or_default().push(issue);
        }

        info!(
            files = by_file.len(),
            dry_run = options.dry_run,
            run_id = %run_id,
            "Fixing issues"
        );

        for (file, issues) in &by_file {
            let outcome = match self.fix_file(file, issues, options.dry_run, &run_id) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(path = %file, error = %e, "Failed to fix file");
                    result.errors.push(FileError::new(file, format!("{:#}", e)));
                    continue;
                }
            };

            result.skipped.extend(outcome.skipped);
            if outcome.fixed.is_empty() {
                continue;
            }

            result.files_fixed += 1;
            result.issues_fixed += outcome.fixed.len();
            if let Some(diff) = outcome.preview {
                result.previews.push(FilePreview {
                    file: file.clone(),
                    diff,
                });
            }

            let backup_path = outcome
                .backup
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            let fixed_at = Utc::now();
            result
                .fixes
                .extend(outcome.fixed.iter().map(|issue| FixRecord {
                    run_id: run_id.clone(),
                    issue_id: issue.id.clone(),
                    file: file.clone(),
                    rule: issue.rule.clone(),
                    backup_created: backup_path.is_some(),
                    backup_path: backup_path.clone(),
                    success: true,
                    fixed_at,
                }));
        }

        if !options.dry_run {
            self.store_mut()?.record(&result.fixes)?;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            files_fixed = result.files_fixed,
            issues_fixed = result.issues_fixed,
            skipped = result.skipped.len(),
            errors = result.errors.len(),
            "Fix run complete"
        );

        Ok(result)
    }

    fn fix_file(
        &self,
        file: &str,
        issues: &[AnalysisIssue],
        dry_run: bool,
        run_id: &str,
    ) -> Result<FileOutcome> {
        let relative = Path::new(file);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!("Refusing to fix a file outside the project");
        }

        let path = self.config.project_root.join(relative);
        let original =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let language = Language::from_path(&path);
        let model = SourceModel::parse(language, &original);

        let mut outcome = FileOutcome {
            fixed: Vec::new(),
            skipped: Vec::new(),
            preview: None,
            backup: None,
        };
        let mut accepted: Vec<Edit> = Vec::new();

        for issue in issues {
            let edits = match self.edits_for(&model, language, issue) {
                Ok(edits) => edits,
                Err(reason) => {
                    debug!(issue = %issue.id, reason, "Skipping issue");
                    outcome.skipped.push(SkippedIssue {
                        issue_id: issue.id.clone(),
                        file: file.to_string(),
                        line: issue.line,
                        rule: issue.rule.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            if edits.iter().any(|e| accepted.iter().any(|a| a.overlaps(e))) {
                outcome.skipped.push(SkippedIssue {
                    issue_id: issue.id.clone(),
                    file: file.to_string(),
                    line: issue.line,
                    rule: issue.rule.clone(),
                    reason: "Conflicts with another fix on the same line".to_string(),
                });
                continue;
            }

            accepted.extend(edits);
            outcome.fixed.push(issue.clone());
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        let updated = apply_edits(&original, &accepted);

        if dry_run {
            outcome.preview = Some(
                TextDiff::from_lines(&original, &updated)
                    .unified_diff()
                    .context_radius(2)
                    .header(&format!("a/{}", file), &format!("b/{}", file))
                    .to_string(),
            );
            return Ok(outcome);
        }

        let backup = self.config.fix.backup_dir.join(run_id).join(file);
        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create backup directory {:?}", parent))?;
        }
        std::fs::write(&backup, original.as_bytes())
            .with_context(|| format!("Failed to write backup {:?}", backup))?;
        std::fs::write(&path, updated.as_bytes())
            .with_context(|| format!("Failed to write {:?}", path))?;

        debug!(path = %file, fixed = outcome.fixed.len(), backup = ?backup, "Rewrote file");
        outcome.backup = Some(backup);
        Ok(outcome)
    }

    /// Edits for one issue, or why it cannot be fixed right now
    fn edits_for(
        &self,
        model: &SourceModel,
        language: Language,
        issue: &AnalysisIssue,
    ) -> Result<Vec<Edit>, &'static str> {
        let rule = self.rules.get(&issue.rule).ok_or("Unknown rule")?;
        if !rule.fixable() {
            return Err("Rule has no automatic fix");
        }
        let line = model.line(issue.line).ok_or("Line no longer exists")?;
        if !rule.applies_to(language) || rule.check(model, line).is_none() {
            return Err("Issue no longer present; re-run analysis");
        }
        rule.fix(model, line)
            .ok_or("No safe automatic fix for this occurrence")
    }

    /// Recent fix rows plus totals; empty when nothing has been fixed
    pub fn get_fix_history(&mut self, limit: Option<usize>) -> Result<FixHistory> {
        if self.store.is_none() {
            self.store = FixStore::open_existing(&self.config.stores.fixes)?;
        }
        let Some(store) = &self.store else {
            return Ok(FixHistory::default());
        };

        Ok(FixHistory {
            records: store.recent(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))?,
            summary: store.summary()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyzeOptions, Analyzer};

    const SAMPLE: &str = "function greet(name: any) {\n  console.log(name);\n  if (name == \"admin\") { console.log(\"hi\"); }\n  // TODO roles\n  return false;\n}\n";

    fn setup() -> (tempfile::TempDir, WorkspaceConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/greet.ts"), SAMPLE).unwrap();
        let config = WorkspaceConfig::for_project(dir.path());
        Analyzer::new(config.clone())
            .analyze(&AnalyzeOptions::default())
            .unwrap();
        (dir, config)
    }

    fn reasons(result: &FixResult) -> Vec<(String, String)> {
        result
            .skipped
            .iter()
            .map(|s| (s.rule.clone(), s.reason.clone()))
            .collect()
    }

    #[test]
    fn test_apply_fixes() {
        let (dir, config) = setup();
        let mut fixer = Fixer::new(config);
        let result = fixer.fix_issues(&FixOptions::default()).unwrap();

        assert!(result.success);
        assert_eq!(result.files_fixed, 1);
        assert_eq!(result.issues_fixed, 3);
        assert_eq!(
            reasons(&result),
            vec![
                ("no-console".to_string(), "No safe automatic fix for this occurrence".to_string()),
                ("todo-comment".to_string(), "Rule has no automatic fix".to_string()),
            ]
        );

        let fixed = std::fs::read_to_string(dir.path().join("src/greet.ts")).unwrap();
        assert_eq!(
            fixed,
            "function greet(name: unknown) {\n  if (name === \"admin\") { console.log(\"hi\"); }\n  // TODO roles\n  return false;\n}\n"
        );

        let backup = result.fixes[0].backup_path.clone().unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), SAMPLE);
        assert!(result.fixes.iter().all(|f| f.backup_path == result.fixes[0].backup_path));

        let history = fixer.get_fix_history(None).unwrap();
        assert_eq!(history.summary.total_fixes, 3);
        assert_eq!(history.summary.total_runs, 1);
    }

    #[test]
    fn test_dry_run_is_pure() {
        let (dir, config) = setup();
        let mut fixer = Fixer::new(config.clone());
        let result = fixer
            .fix_issues(&FixOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(result.issues_fixed, 3);
        assert_eq!(result.previews.len(), 1);
        assert!(result.previews[0].diff.contains("-  console.log(name);"));
        assert!(result.previews[0].diff.contains("+function greet(name: unknown) {"));
        assert!(result.fixes.iter().all(|f| !f.backup_created));

        assert_eq!(std::fs::read_to_string(dir.path().join("src/greet.ts")).unwrap(), SAMPLE);
        assert!(!config.stores.fixes.exists());
        assert!(!config.fix.backup_dir.exists());
        assert_eq!(fixer.get_fix_history(None).unwrap().summary.total_fixes, 0);
    }

    #[test]
    fn test_selected_and_stale_issues() {
        let (_dir, config) = setup();
        let mut fixer = Fixer::new(config.clone());

        let store = AnalysisStore::open_existing(&config.stores.analysis).unwrap().unwrap();
        let eqeqeq = store
            .all_issues()
            .unwrap()
            .into_iter()
            .find(|i| i.rule == "eqeqeq")
            .unwrap();

        let options = FixOptions {
            issue_ids: Some(vec![eqeqeq.id.clone(), "0000000000000000".to_string()]),
            dry_run: false,
        };
        let first = fixer.fix_issues(&options).unwrap();
        assert_eq!(first.issues_fixed, 1);
        assert_eq!(reasons(&first), vec![(String::new(), "Issue not found".to_string())]);

        // the stored issue is now stale until analysis runs again
        let second = fixer.fix_issues(&options).unwrap();
        assert_eq!(second.issues_fixed, 0);
        assert!(second
            .skipped
            .iter()
            .any(|s| s.rule == "eqeqeq" && s.reason == "Issue no longer present; re-run analysis"));
    }

    #[test]
    fn test_missing_analysis_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::for_project(dir.path());
        let mut fixer = Fixer::new(config.clone());

        let result = fixer.fix_issues(&FixOptions::default()).unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(!config.stores.fixes.exists());
    }

    #[test]
    fn test_unreadable_file_does_not_abort() {
        let (dir, config) = setup();
        std::fs::write(dir.path().join("src/other.ts"), "let a: any = 1;\n").unwrap();
        Analyzer::new(config.clone())
            .analyze(&AnalyzeOptions::default())
            .unwrap();
        std::fs::remove_file(dir.path().join("src/other.ts")).unwrap();

        let result = Fixer::new(config).fix_issues(&FixOptions::default()).unwrap();
        assert!(result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "src/other.ts");
        assert_eq!(result.files_fixed, 1);
    }

    #[test]
    fn test_refuses_files_outside_project() {
        let (dir, config) = setup();
        let victim = dir.path().parent().unwrap().join(format!(
            "{}-victim.js",
            dir.path().file_name().unwrap().to_string_lossy()
        ));
        std::fs::write(&victim, "if (a == b) {}\n").unwrap();
        let escaped = format!("../{}", victim.file_name().unwrap().to_string_lossy());

        let rules = RuleSet::new(&config.analysis);
        let issues = crate::analysis::detect(&rules, &escaped, Language::JavaScript, "if (a == b) {}\n");
        assert_eq!(issues.len(), 1);
        let mut store = AnalysisStore::open(&config.stores.analysis).unwrap();
        store
            .sync(Some(escaped.as_str()), &BTreeMap::from([(escaped.clone(), issues)]))
            .unwrap();

        let result = Fixer::new(config).fix_issues(&FixOptions::default()).unwrap();
        let outside = std::fs::read_to_string(&victim).unwrap();
        std::fs::remove_file(&victim).unwrap();

        assert_eq!(outside, "if (a == b) {}\n");
        assert!(result.errors.iter().any(|e| e.path == escaped));
        assert!(result.fixes.iter().all(|f| f.file != escaped));
        assert_eq!(result.files_fixed, 1);
    }
}
