//! Project tree discovery shared by the indexer, search engine and analyzer
//!
//! Each component walks the tree on its own; nothing is shared between runs
//! except this walking and reading code.

pub mod language;

pub use language::{CommentStyle, Language};

use crate::config::STATE_DIR_NAME;
use crate::error::FileError;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Compute a stable hash for content
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Include/exclude glob matching on project-relative paths
#[derive(Debug, Clone)]
pub struct PathMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// Whether a file should be visited
    pub fn matches(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Whether a whole directory can be skipped
    ///
    /// A directory is pruned when the exclude set matches the directory or
    /// any path directly inside it.
    pub fn excludes_dir(&self, relative: &str) -> bool {
        if relative.is_empty() {
            return false;
        }
        self.exclude.is_match(relative) || self.exclude.is_match(format!("{}/{}", relative, DIR_SENTINEL))
    }
}

const DIR_SENTINEL: &str = "__dir_sentinel__";

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build glob set")
}

/// Limits applied while walking
#[derive(Debug, Clone)]
pub struct WalkLimits {
    pub max_file_size: u64,
    pub max_files: usize,
    pub max_depth: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_file_size: u64::MAX,
            max_files: usize::MAX,
            max_depth: usize::MAX,
        }
    }
}

/// A file selected by a walk
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Project-relative path with forward slashes
    pub relative: String,
    pub size: u64,
    pub language: Language,
}

/// A directory visited by a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFolder {
    pub relative: String,
    pub depth: usize,
}

/// Outcome of a walk
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub folders: Vec<DiscoveredFolder>,
    /// Files skipped for exceeding the size limit
    pub skipped_large: usize,
    /// Whether the file count limit cut the walk short
    pub truncated: bool,
    pub errors: Vec<FileError>,
}

/// Walk `walk_root` (the project root or a sub-path of it) in sorted order
///
/// Relative paths are always computed against `project_root`.
pub fn discover(
    project_root: &Path,
    walk_root: &Path,
    matcher: &PathMatcher,
    limits: &WalkLimits,
) -> Discovery {
    let mut discovery = Discovery::default();
    let relative_of = |path: &Path| -> String {
        path.strip_prefix(project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    };

    let walker = WalkDir::new(walk_root)
        .follow_links(false)
        .max_depth(limits.max_depth.saturating_add(1))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if name == STATE_DIR_NAME {
                return false;
            }
            !matcher.excludes_dir(&relative_of(entry.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_of(p))
                    .unwrap_or_else(|| relative_of(walk_root));
                warn!(path = %path, error = %e, "Failed to walk entry");
                discovery.errors.push(FileError::new(path, e));
                continue;
            }
        };

        let relative = relative_of(entry.path());

        if entry.file_type().is_dir() {
            if !relative.is_empty() {
                discovery.folders.push(DiscoveredFolder {
                    depth: relative.matches('/').count() + 1,
                    relative,
                });
            }
            continue;
        }

        if !entry.file_type().is_file() || !matcher.matches(&relative) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                discovery.errors.push(FileError::new(relative, e));
                continue;
            }
        };

        if size > limits.max_file_size {
            debug!(path = %relative, size, "Skipping file over size limit");
            discovery.skipped_large += 1;
            continue;
        }

        if discovery.files.len() >= limits.max_files {
            discovery.truncated = true;
            break;
        }

        discovery.files.push(DiscoveredFile {
            path: entry.path().to_path_buf(),
            language: Language::from_path(entry.path()),
            relative,
            size,
        });
    }

    debug!(
        files = discovery.files.len(),
        folders = discovery.folders.len(),
        skipped = discovery.skipped_large,
        "Walk complete"
    );

    discovery
}

/// Content read from a discovered file
#[derive(Debug, Clone)]
pub struct FileContent {
    pub hash: String,
    /// `None` for binary files
    pub text: Option<String>,
}

/// Read a single file, detecting binary content
pub fn read_file(path: &Path) -> Result<FileContent> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let hash = content_hash(&bytes);

    let head = &bytes[..bytes.len().min(8192)];
    if head.contains(&0) {
        return Ok(FileContent { hash, text: None });
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };

    Ok(FileContent {
        hash,
        text: Some(text),
    })
}

/// Read every file, optionally on a bounded worker pool
///
/// The output is in the same order as the input regardless of scheduling.
pub fn read_files(
    files: &[DiscoveredFile],
    parallel: bool,
    worker_threads: usize,
) -> Vec<Result<FileContent>> {
    if !parallel || files.len() < 2 {
        return files.iter().map(|f| read_file(&f.path)).collect();
    }

    let threads = match worker_threads {
        0 => rayon::current_num_threads(),
        n => n,
    }
    .min(files.len());

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| files.par_iter().map(|f| read_file(&f.path)).collect()),
        Err(e) => {
            warn!(error = %e, "Failed to build worker pool, reading sequentially");
            files.iter().map(|f| read_file(&f.path)).collect()
        }
    }
}
