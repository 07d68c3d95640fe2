//! Database schemas, one per store

/// Connection pragmas applied to every store
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
"#;

/// Per-connection settings for stores opened read-mostly; nothing is written
pub const CONNECTION_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
"#;

/// Index store: file metadata, folders, dependency references and build runs
pub const INDEX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    language TEXT NOT NULL,
    line_count INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    keywords TEXT,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_language ON files(language);

CREATE TABLE IF NOT EXISTS folders (
    path TEXT PRIMARY KEY,
    depth INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    kind TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dependencies_source ON dependencies(source);

CREATE TABLE IF NOT EXISTS frameworks (
    name TEXT PRIMARY KEY,
    evidence TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS index_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_path TEXT NOT NULL,
    files_indexed INTEGER NOT NULL,
    folders_scanned INTEGER NOT NULL,
    status TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    started_at TEXT NOT NULL
);
"#;

/// Search store: one row per physical line plus query history
pub const SEARCH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS search_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_path TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content TEXT NOT NULL,
    line_number INTEGER NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_lines_file ON search_lines(file_path);

CREATE TABLE IF NOT EXISTS query_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    query_type TEXT NOT NULL,
    searched_at TEXT NOT NULL
);
"#;

/// Analysis store: one row per (file, line, rule)
pub const ANALYSIS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    issue_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL,
    column INTEGER,
    message TEXT NOT NULL,
    description TEXT NOT NULL,
    suggestion TEXT,
    rule TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_file ON issues(file);
CREATE INDEX IF NOT EXISTS idx_issues_severity ON issues(severity);
"#;

/// Fixes store: one row per resolved issue
pub const FIXES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS fix_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    file TEXT NOT NULL,
    rule TEXT NOT NULL,
    backup_created INTEGER NOT NULL DEFAULT 0,
    backup_path TEXT,
    success INTEGER NOT NULL,
    fixed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fix_history_run ON fix_history(run_id);
CREATE INDEX IF NOT EXISTS idx_fix_history_fixed ON fix_history(fixed_at);
"#;
