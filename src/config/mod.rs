//! Workspace configuration for CodeWarden
//!
//! Every component receives a `WorkspaceConfig` at construction time. The
//! config carries the per-project store locations, so two projects never
//! share a store file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project state directory
pub const STATE_DIR_NAME: &str = ".codewarden";

/// Name of the config file inside the state directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration for one project being worked on
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Root of the project tree
    pub project_root: PathBuf,
    /// Directory holding stores, backups and config
    pub state_dir: PathBuf,
    /// Resolved store locations
    pub stores: StoreLocations,
    pub indexing: IndexingSettings,
    pub search: SearchSettings,
    pub analysis: AnalysisSettings,
    pub fix: FixSettings,
}

/// Location of each embedded store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocations {
    pub index: PathBuf,
    pub search: PathBuf,
    pub analysis: PathBuf,
    pub fixes: PathBuf,
}

impl StoreLocations {
    /// Default locations inside a state directory
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            index: state_dir.join("index.db"),
            search: state_dir.join("search.db"),
            analysis: state_dir.join("analysis.db"),
            fixes: state_dir.join("fixes.db"),
        }
    }
}

/// On-disk form of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub stores: StorePaths,
    #[serde(default)]
    pub indexing: IndexingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub fix: FixFileSettings,
}

/// Store paths as written in the config file, relative to the state directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorePaths {
    pub index: Option<PathBuf>,
    pub search: Option<PathBuf>,
    pub analysis: Option<PathBuf>,
    pub fixes: Option<PathBuf>,
}

/// Defaults for `index_project`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Glob patterns for files to index
    #[serde(default = "default_index_include")]
    pub include_patterns: Vec<String>,

    /// Glob patterns to skip
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of files recorded per build
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum directory depth below the project root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Read files on a worker pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Worker pool size cap (0 lets rayon decide)
    #[serde(default)]
    pub worker_threads: usize,
}

/// Defaults for the search engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_include")]
    pub include_patterns: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Number of history entries returned by default
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Result cap when the caller gives none
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,

    /// Characters of context on each side of a match
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,
}

/// Analyzer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_search_include")]
    pub include_patterns: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Lines longer than this are flagged
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Rule ids that never fire
    #[serde(default)]
    pub disabled_rules: Vec<String>,
}

/// Fixer settings as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixFileSettings {
    /// Backup directory, relative to the state directory
    pub backup_dir: Option<PathBuf>,
}

/// Resolved fixer settings
#[derive(Debug, Clone)]
pub struct FixSettings {
    pub backup_dir: PathBuf,
}

fn default_index_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_search_include() -> Vec<String> {
    [
        "js", "jsx", "mjs", "cjs", "ts", "tsx", "py", "rs", "go", "java", "c", "h", "cpp", "hpp",
        "cs", "rb", "php", "md", "txt", "json", "yaml", "yml", "toml",
    ]
    .iter()
    .map(|ext| format!("**/*.{}", ext))
    .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
        "**/.git/**".to_string(),
        "**/.svn/**".to_string(),
        "**/.hg/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
        "**/vendor/**".to_string(),
        "**/*.min.js".to_string(),
        "**/*.lock".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_max_files() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    20
}

fn default_max_results() -> usize {
    50
}

fn default_context_radius() -> usize {
    30
}

fn default_max_line_length() -> usize {
    120
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            include_patterns: default_index_include(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
            max_depth: default_max_depth(),
            parallel: true,
            worker_threads: 0,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            include_patterns: default_search_include(),
            exclude_patterns: default_exclude_patterns(),
            history_limit: default_history_limit(),
            default_max_results: default_max_results(),
            context_radius: default_context_radius(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            include_patterns: default_search_include(),
            exclude_patterns: default_exclude_patterns(),
            max_line_length: default_max_line_length(),
            disabled_rules: Vec::new(),
        }
    }
}

impl WorkspaceConfig {
    /// Defaults for a project root, ignoring any config file
    pub fn for_project<P: AsRef<Path>>(project_root: P) -> Self {
        Self::from_file(project_root.as_ref(), ConfigFile::default())
    }

    /// Load `<project>/.codewarden/config.toml` or fall back to defaults
    pub fn load<P: AsRef<Path>>(project_root: P) -> Result<Self> {
        let project_root = project_root.as_ref();
        let config_path = project_root.join(STATE_DIR_NAME).join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let file: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(Self::from_file(project_root, file))
        } else {
            Ok(Self::for_project(project_root))
        }
    }

    fn from_file(project_root: &Path, file: ConfigFile) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        let defaults = StoreLocations::in_dir(&state_dir);
        let resolve = |custom: Option<PathBuf>, default: PathBuf| match custom {
            Some(p) if p.is_absolute() => p,
            Some(p) => state_dir.join(p),
            None => default,
        };

        let stores = StoreLocations {
            index: resolve(file.stores.index, defaults.index),
            search: resolve(file.stores.search, defaults.search),
            analysis: resolve(file.stores.analysis, defaults.analysis),
            fixes: resolve(file.stores.fixes, defaults.fixes),
        };
        let fix = FixSettings {
            backup_dir: resolve(file.fix.backup_dir, state_dir.join("backups")),
        };

        Self {
            project_root: project_root.to_path_buf(),
            state_dir,
            stores,
            indexing: file.indexing,
            search: file.search,
            analysis: file.analysis,
            fix,
        }
    }

    /// Override the state directory, moving every default location with it
    pub fn with_state_dir<P: AsRef<Path>>(mut self, state_dir: P) -> Self {
        let state_dir = state_dir.as_ref().to_path_buf();
        self.stores = StoreLocations::in_dir(&state_dir);
        self.fix.backup_dir = state_dir.join("backups");
        self.state_dir = state_dir;
        self
    }

    /// Path of the config file for this project
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE_NAME)
    }

    /// The current settings as they would be written to the config file
    pub fn to_file(&self) -> ConfigFile {
        let relative = |p: &Path| -> Option<PathBuf> {
            Some(
                p.strip_prefix(&self.state_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| p.to_path_buf()),
            )
        };

        ConfigFile {
            stores: StorePaths {
                index: relative(&self.stores.index),
                search: relative(&self.stores.search),
                analysis: relative(&self.stores.analysis),
                fixes: relative(&self.stores.fixes),
            },
            indexing: self.indexing.clone(),
            search: self.search.clone(),
            analysis: self.analysis.clone(),
            fix: FixFileSettings {
                backup_dir: relative(&self.fix.backup_dir),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_file()).context("Failed to serialize configuration")
    }

    /// Write the current settings to the config file
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("Failed to create {:?}", self.state_dir))?;

        let content = self.to_toml()?;
        let config_path = self.config_path();
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Path relative to the project root, with forward slashes
    pub fn relative_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.project_root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}
