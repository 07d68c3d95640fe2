//! SQLite storage layer for CodeWarden
//!
//! Four independent stores, each owned by one component:
//! - Index store: file metadata, folders, dependency references
//! - Search store: line table and query history
//! - Analysis store: detected issues
//! - Fixes store: fix history
//!
//! A zero-byte or unopenable store file is never an error. It is deleted and
//! treated as absent, so the owning component recreates it on next use.

mod analysis_store;
mod fix_store;
mod index_store;
mod schema;
mod search_store;

pub use analysis_store::{AnalysisStore, SeverityCounts};
pub use fix_store::FixStore;
pub use index_store::{IndexSnapshot, IndexStore};
pub use schema::{
    ANALYSIS_SCHEMA, CONNECTION_PRAGMAS, FIXES_SCHEMA, INDEX_SCHEMA, PRAGMAS, SEARCH_SCHEMA,
};
pub use search_store::{LineQuery, SearchStats, SearchStore};

use crate::error::CoreError;
use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which concern a store file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Index,
    Search,
    Analysis,
    Fixes,
}

impl StoreKind {
    pub fn schema(&self) -> &'static str {
        match self {
            StoreKind::Index => INDEX_SCHEMA,
            StoreKind::Search => SEARCH_SCHEMA,
            StoreKind::Analysis => ANALYSIS_SCHEMA,
            StoreKind::Fixes => FIXES_SCHEMA,
        }
    }

    /// Table whose presence marks a store as initialized
    pub fn primary_table(&self) -> &'static str {
        match self {
            StoreKind::Index => "files",
            StoreKind::Search => "search_lines",
            StoreKind::Analysis => "issues",
            StoreKind::Fixes => "fix_history",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Index => write!(f, "index"),
            StoreKind::Search => write!(f, "search"),
            StoreKind::Analysis => write!(f, "analysis"),
            StoreKind::Fixes => write!(f, "fixes"),
        }
    }
}

/// Open a store, creating it if needed and recreating it if it is corrupt
pub fn open_store(path: &Path, kind: StoreKind) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store directory {:?}", parent))?;
    }

    if is_zero_byte(path) {
        warn!(store = %kind, path = ?path, "Zero-byte store file, reinitializing");
        remove_store_files(path)?;
    }

    match initialize(path, kind, true) {
        Ok(conn) => Ok(conn),
        Err(e) => {
            warn!(store = %kind, path = ?path, error = %e, "Store unusable, reinitializing");
            remove_store_files(path)?;
            initialize(path, kind, true)
                .with_context(|| format!("Failed to recreate {} store at {:?}", kind, path))
        }
    }
}

/// Open a store only if it already exists and is valid
///
/// Invalid files are deleted so the owning component can recreate them.
pub fn open_existing(path: &Path, kind: StoreKind) -> Result<Option<Connection>> {
    if !path.exists() {
        return Ok(None);
    }

    if is_zero_byte(path) {
        warn!(store = %kind, path = ?path, "Zero-byte store file treated as absent");
        remove_store_files(path)?;
        return Ok(None);
    }

    match initialize(path, kind, false) {
        Ok(conn) => Ok(Some(conn)),
        Err(e) => {
            warn!(store = %kind, path = ?path, error = %e, "Invalid store treated as absent");
            remove_store_files(path)?;
            Ok(None)
        }
    }
}

/// Open (without creating) and validate a store file
fn initialize(path: &Path, kind: StoreKind, create: bool) -> Result<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let conn = Connection::open_with_flags(path, flags)
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .context("Integrity check failed")?;
    if check != "ok" {
        return Err(CoreError::StoreCorrupt {
            path: path.to_path_buf(),
            reason: check,
        }
        .into());
    }

    if !create && !has_table(&conn, kind.primary_table())? {
        return Err(CoreError::StoreCorrupt {
            path: path.to_path_buf(),
            reason: format!("missing table {}", kind.primary_table()),
        }
        .into());
    }

    // An existing store keeps its journal mode and tables as they are
    if create {
        conn.execute_batch(PRAGMAS)
            .context("Failed to apply connection pragmas")?;
        conn.execute_batch(kind.schema())
            .context("Failed to initialize database schema")?;
    } else {
        conn.execute_batch(CONNECTION_PRAGMAS)
            .context("Failed to apply connection pragmas")?;
    }

    debug!(store = %kind, path = ?path, "Store opened");
    Ok(conn)
}

fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn is_zero_byte(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() == 0)
        .unwrap_or(false)
}

/// Delete a store file and its WAL/shared-memory siblings
pub fn remove_store_files(path: &Path) -> Result<()> {
    for candidate in store_files(path) {
        if candidate.exists() {
            std::fs::remove_file(&candidate)
                .with_context(|| format!("Failed to remove {:?}", candidate))?;
        }
    }
    Ok(())
}

fn store_files(path: &Path) -> [PathBuf; 3] {
    let sibling = |suffix: &str| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), sibling("-wal"), sibling("-shm")]
}

/// Size of a store file on disk, zero when missing
pub fn store_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Escape `%`, `_` and `\` for use in a LIKE pattern with `ESCAPE '\'`
pub(crate) fn escape_like_pattern(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");

        let conn = open_store(&path, StoreKind::Index).unwrap();
        assert!(has_table(&conn, "files").unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_open_existing_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.db");

        assert!(open_existing(&path, StoreKind::Search).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_byte_store_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.db");
        std::fs::write(&path, b"").unwrap();

        assert!(open_existing(&path, StoreKind::Analysis).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_store_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.db");
        std::fs::write(&path, b"this is definitely not a sqlite database file").unwrap();

        let conn = open_store(&path, StoreKind::Fixes).unwrap();
        assert!(has_table(&conn, "fix_history").unwrap());
    }

    #[test]
    fn test_foreign_store_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        drop(open_store(&path, StoreKind::Search).unwrap());

        assert!(open_existing(&path, StoreKind::Index).unwrap().is_none());
    }

    #[test]
    fn test_open_existing_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(StoreKind::Fixes.schema()).unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        let conn = open_existing(&path, StoreKind::Fixes).unwrap().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "delete");
        let [_, wal, shm] = store_files(&path);
        assert!(!wal.exists());
        assert!(!shm.exists());
        drop(conn);

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("a_b%c"), "a\\_b\\%c");
        assert_eq!(escape_like_pattern("plain"), "plain");
    }
}
