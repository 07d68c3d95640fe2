//! System status across the four stores
//!
//! Status never creates a store. Each store is opened only if it already
//! exists; a zero-byte or unreadable file is removed and reported as absent,
//! the same recovery the owning component would apply on its next run.

use crate::config::WorkspaceConfig;
use crate::storage::{store_size, AnalysisStore, FixStore, IndexStore, SearchStore, SeverityCounts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    #[default]
    Status,
    Detailed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusOptions {
    pub action: StatusAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub exists: bool,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl StoreStatus {
    fn absent(path: &Path) -> Self {
        Self {
            exists: false,
            path: path.to_path_buf(),
            size_bytes: 0,
        }
    }

    fn present(path: &Path) -> Self {
        Self {
            exists: true,
            path: path.to_path_buf(),
            size_bytes: store_size(path),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    #[serde(flatten)]
    pub store: StoreStatus,
    pub file_count: usize,
    pub languages: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHealth {
    #[serde(flatten)]
    pub store: StoreStatus,
    pub line_count: usize,
    pub file_count: usize,
    pub comment_lines: usize,
    pub queries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHealth {
    #[serde(flatten)]
    pub store: StoreStatus,
    pub total_issues: usize,
    pub by_severity: SeverityCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixesHealth {
    #[serde(flatten)]
    pub store: StoreStatus,
    pub total_fixes: usize,
    pub last_fix_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size; `None` where the platform does not expose it
    pub resident_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub project_path: PathBuf,
    pub action: StatusAction,
    pub index: IndexHealth,
    pub search: SearchHealth,
    pub analysis: AnalysisHealth,
    pub fixes: FixesHealth,
    pub memory: MemoryUsage,
    /// Filled in detailed mode only
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Reads every store without writing to any of them
pub struct StatusAggregator {
    config: WorkspaceConfig,
}

impl StatusAggregator {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    pub fn status(&self, options: &StatusOptions) -> Result<SystemStatus> {
        let stores = &self.config.stores;

        let index = match inspect(&stores.index, IndexStore::open_existing, |store| {
            Ok(IndexHealth {
                store: StoreStatus::present(&stores.index),
                file_count: store.file_count()?,
                languages: store.language_histogram()?,
            })
        }) {
            Some(health) => health,
            None => IndexHealth {
                store: StoreStatus::absent(&stores.index),
                file_count: 0,
                languages: BTreeMap::new(),
            },
        };

        let search = match inspect(&stores.search, SearchStore::open_existing, |store| {
            let stats = store.stats()?;
            Ok(SearchHealth {
                store: StoreStatus::present(&stores.search),
                line_count: stats.lines,
                file_count: stats.files,
                comment_lines: stats.comment_lines,
                queries: stats.queries,
            })
        }) {
            Some(health) => health,
            None => SearchHealth {
                store: StoreStatus::absent(&stores.search),
                line_count: 0,
                file_count: 0,
                comment_lines: 0,
                queries: 0,
            },
        };

        let analysis = match inspect(&stores.analysis, AnalysisStore::open_existing, |store| {
            let by_severity = store.count_by_severity()?;
            Ok(AnalysisHealth {
                store: StoreStatus::present(&stores.analysis),
                total_issues: by_severity.total,
                by_severity,
            })
        }) {
            Some(health) => health,
            None => AnalysisHealth {
                store: StoreStatus::absent(&stores.analysis),
                total_issues: 0,
                by_severity: SeverityCounts::default(),
            },
        };

        let fixes = match inspect(&stores.fixes, FixStore::open_existing, |store| {
            Ok(FixesHealth {
                store: StoreStatus::present(&stores.fixes),
                total_fixes: store.count()?,
                last_fix_at: store.last_fix_at()?,
            })
        }) {
            Some(health) => health,
            None => FixesHealth {
                store: StoreStatus::absent(&stores.fixes),
                total_fixes: 0,
                last_fix_at: None,
            },
        };

        let recommendations = match options.action {
            StatusAction::Detailed => recommend(&index, &search, &analysis, &fixes),
            StatusAction::Status => Vec::new(),
        };

        Ok(SystemStatus {
            project_path: self.config.project_root.clone(),
            action: options.action,
            index,
            search,
            analysis,
            fixes,
            memory: memory_usage(),
            recommendations,
            generated_at: Utc::now(),
        })
    }
}

/// Open an existing store and summarize it; any failure reads as absent
fn inspect<S, T>(
    path: &Path,
    open: impl FnOnce(&Path) -> Result<Option<S>>,
    summarize: impl FnOnce(&S) -> Result<T>,
) -> Option<T> {
    let store = match open(path) {
        Ok(Some(store)) => store,
        Ok(None) => {
            debug!(path = ?path, "Store absent");
            return None;
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Store could not be opened");
            return None;
        }
    };

    match summarize(&store) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!(path = ?path, error = %e, "Store could not be read");
            None
        }
    }
}

/// One recommendation per missing capability, index first
fn recommend(
    index: &IndexHealth,
    search: &SearchHealth,
    analysis: &AnalysisHealth,
    fixes: &FixesHealth,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if !index.store.exists {
        recommendations
            .push("Index the project to record its files and languages (codewarden index)".to_string());
    }
    if !search.store.exists {
        recommendations.push(
            "Build the search index by running a search (codewarden search <query>)".to_string(),
        );
    }
    if !analysis.store.exists {
        recommendations.push("Analyze the project to detect issues (codewarden analyze)".to_string());
    }
    if !fixes.store.exists {
        recommendations.push(
            "Preview and apply automatic fixes (codewarden fix --dry-run, then codewarden fix)"
                .to_string(),
        );
    }
    if analysis.by_severity.high > 0 && fixes.total_fixes == 0 {
        recommendations.push(format!(
            "Review the {} high-severity issues, fix them and re-run analysis",
            analysis.by_severity.high
        ));
    }

    recommendations
}

#[cfg(target_os = "linux")]
fn memory_usage() -> MemoryUsage {
    let resident_bytes = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("VmRSS:"))
                .and_then(|value| value.split_whitespace().next())
                .and_then(|kb| kb.parse::<u64>().ok())
        })
        .map(|kb| kb * 1024);
    MemoryUsage { resident_bytes }
}

#[cfg(not(target_os = "linux"))]
fn memory_usage() -> MemoryUsage {
    MemoryUsage::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detailed() -> StatusOptions {
        StatusOptions {
            action: StatusAction::Detailed,
        }
    }

    #[test]
    fn test_clean_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::for_project(dir.path());
        let status = StatusAggregator::new(config.clone()).status(&detailed()).unwrap();

        assert!(!status.index.store.exists);
        assert!(!status.search.store.exists);
        assert!(!status.analysis.store.exists);
        assert!(!status.fixes.store.exists);
        assert_eq!(status.recommendations.len(), 4);
        assert!(status.recommendations[0].contains("codewarden index"));
        assert!(status.recommendations[3].contains("codewarden fix"));
        assert!(!config.state_dir.exists());
    }

    #[test]
    fn test_corrupt_store_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::for_project(dir.path());
        std::fs::create_dir_all(&config.state_dir).unwrap();
        std::fs::write(&config.stores.index, b"").unwrap();
        std::fs::write(&config.stores.analysis, b"definitely not sqlite").unwrap();

        let status = StatusAggregator::new(config.clone())
            .status(&StatusOptions::default())
            .unwrap();
        assert!(!status.index.store.exists);
        assert!(!status.analysis.store.exists);
        assert!(status.recommendations.is_empty());
        assert!(!config.stores.index.exists());
        assert!(!config.stores.analysis.exists());
    }

    #[test]
    fn test_recommendation_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::for_project(dir.path());
        IndexStore::open(&config.stores.index).unwrap();
        AnalysisStore::open(&config.stores.analysis).unwrap();

        let status = StatusAggregator::new(config).status(&detailed()).unwrap();
        assert!(status.index.store.exists);
        assert!(status.index.store.size_bytes > 0);
        assert_eq!(status.recommendations.len(), 2);
        assert!(status.recommendations[0].contains("search"));
        assert!(status.recommendations[1].contains("fix"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_usage() {
        assert!(memory_usage().resident_bytes.unwrap_or(0) > 0);
    }
}
