//! Index store: file metadata for the last build

use super::{open_existing, open_store, StoreKind};
use crate::indexer::{DependencyRef, FileRecord, FolderRecord, FrameworkHit, IndexRun};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// Everything a single build writes
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    pub files: Vec<FileRecord>,
    pub folders: Vec<FolderRecord>,
    pub dependencies: Vec<DependencyRef>,
    pub frameworks: Vec<FrameworkHit>,
}

pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    /// Open or create the index store
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_store(path, StoreKind::Index)?,
        })
    }

    /// Open only if a valid index store already exists
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        Ok(open_existing(path, StoreKind::Index)?.map(|conn| Self { conn }))
    }

    /// Replace the stored snapshot with a fresh one in a single transaction
    pub fn replace_snapshot(&mut self, snapshot: &IndexSnapshot) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start index transaction")?;

        tx.execute_batch(
            "DELETE FROM files; DELETE FROM folders; DELETE FROM dependencies; DELETE FROM frameworks;",
        )
        .context("Failed to clear index")?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO files (path, size, language, line_count, content_hash, keywords, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for file in &snapshot.files {
                let keywords = file.keywords.as_ref().map(|k| k.join(" "));
                stmt.execute(params![
                    file.path,
                    file.size as i64,
                    file.language,
                    file.line_count as i64,
                    file.content_hash,
                    keywords,
                    file.indexed_at,
                ])
                .with_context(|| format!("Failed to insert file record {}", file.path))?;
            }

            let mut stmt = tx.prepare("INSERT INTO folders (path, depth) VALUES (?1, ?2)")?;
            for folder in &snapshot.folders {
                stmt.execute(params![folder.path, folder.depth as i64])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO dependencies (source, target, kind, line) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for dep in &snapshot.dependencies {
                stmt.execute(params![dep.source, dep.target, dep.kind, dep.line as i64])?;
            }

            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO frameworks (name, evidence) VALUES (?1, ?2)")?;
            for framework in &snapshot.frameworks {
                stmt.execute(params![framework.name, framework.evidence])?;
            }
        }

        tx.commit().context("Failed to commit index snapshot")?;
        Ok(())
    }

    /// Record the outcome of a build
    pub fn record_run(&self, run: &IndexRun) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO index_runs (project_path, files_indexed, folders_scanned, status, duration_ms, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    run.project_path,
                    run.files_indexed as i64,
                    run.folders_scanned as i64,
                    run.status,
                    run.duration_ms as i64,
                    run.started_at,
                ],
            )
            .context("Failed to record index run")?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<IndexRun>> {
        self.conn
            .query_row(
                r#"
                SELECT project_path, files_indexed, folders_scanned, status, duration_ms, started_at
                FROM index_runs ORDER BY id DESC LIMIT 1
                "#,
                [],
                |row| {
                    Ok(IndexRun {
                        project_path: row.get(0)?,
                        files_indexed: row.get::<_, i64>(1)? as usize,
                        folders_scanned: row.get::<_, i64>(2)? as usize,
                        status: row.get(3)?,
                        duration_ms: row.get::<_, i64>(4)? as u64,
                        started_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to get last index run")
    }

    /// All file records ordered by path
    pub fn files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT path, size, language, line_count, content_hash, keywords, indexed_at
            FROM files ORDER BY path
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let keywords: Option<String> = row.get(5)?;
            let indexed_at: DateTime<Utc> = row.get(6)?;
            Ok(FileRecord {
                path: row.get(0)?,
                size: row.get::<_, i64>(1)? as u64,
                language: row.get(2)?,
                line_count: row.get::<_, i64>(3)? as usize,
                content_hash: row.get(4)?,
                keywords: keywords.map(|k| k.split_whitespace().map(str::to_string).collect()),
                indexed_at,
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    pub fn folders(&self) -> Result<Vec<FolderRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, depth FROM folders ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok(FolderRecord {
                path: row.get(0)?,
                depth: row.get::<_, i64>(1)? as usize,
            })
        })?;

        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    pub fn frameworks(&self) -> Result<Vec<FrameworkHit>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, evidence FROM frameworks ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(FrameworkHit {
                name: row.get(0)?,
                evidence: row.get(1)?,
            })
        })?;

        let mut frameworks = Vec::new();
        for row in rows {
            frameworks.push(row?);
        }
        Ok(frameworks)
    }

    pub fn dependencies(&self) -> Result<Vec<DependencyRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, target, kind, line FROM dependencies ORDER BY source, line",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DependencyRef {
                source: row.get(0)?,
                target: row.get(1)?,
                kind: row.get(2)?,
                line: row.get::<_, i64>(3)? as usize,
            })
        })?;

        let mut deps = Vec::new();
        for row in rows {
            deps.push(row?);
        }
        Ok(deps)
    }

    pub fn file_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of files per language
    pub fn language_histogram(&self) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT language, COUNT(*) FROM files GROUP BY language")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;

        let mut histogram = BTreeMap::new();
        for row in rows {
            let (language, count) = row?;
            histogram.insert(language, count);
        }
        Ok(histogram)
    }
}
