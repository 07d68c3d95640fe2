//! Search store: line table and query history

use super::{escape_like_pattern, open_existing, open_store, StoreKind};
use crate::search::{find_offset, ContentType, QueryHistoryEntry, SearchLine};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Row filter pushed down into SQL
#[derive(Debug, Clone, Default)]
pub struct LineQuery {
    /// Substring of the file path
    pub file_filter: Option<String>,
    /// Substring of the line content
    pub contains: Option<String>,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub lines: usize,
    pub files: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub queries: usize,
}

pub struct SearchStore {
    conn: Connection,
}

impl SearchStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_store(path, StoreKind::Search)?,
        })
    }

    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        Ok(open_existing(path, StoreKind::Search)?.map(|conn| Self { conn }))
    }

    pub fn line_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM search_lines", [], |row| row.get(0))
            .context("Failed to count search lines")?;
        Ok(count as usize)
    }

    /// Drop every stored line and insert a fresh snapshot
    pub fn replace_lines(&mut self, lines: &[SearchLine]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start search transaction")?;

        tx.execute("DELETE FROM search_lines", [])
            .context("Failed to clear search lines")?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO search_lines (project_path, file_path, content_type, content, line_number, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for line in lines {
                stmt.execute(params![
                    line.project_path,
                    line.file_path,
                    line.content_type.to_string(),
                    line.content,
                    line.line_number as i64,
                    line.indexed_at,
                ])?;
            }
        }

        tx.commit().context("Failed to commit search lines")?;
        Ok(())
    }

    /// Lines passing the filter, ordered by file and line number
    ///
    /// SQLite's `lower()` only folds ASCII, so case-insensitive content
    /// matching happens here with the same fold the scorer uses.
    pub fn scan(&self, query: &LineQuery) -> Result<Vec<SearchLine>> {
        let file_pattern = query
            .file_filter
            .as_ref()
            .map(|f| format!("%{}%", escape_like_pattern(f)));
        let exact_needle = query.contains.as_deref().filter(|_| query.case_sensitive);
        let folded_needle = query.contains.as_deref().filter(|_| !query.case_sensitive);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT project_path, file_path, content_type, content, line_number, indexed_at
            FROM search_lines
            WHERE (?1 IS NULL OR file_path LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR instr(content, ?2) > 0)
            ORDER BY file_path, line_number
            "#,
        )?;

        let rows = stmt.query_map(params![file_pattern, exact_needle], |row| {
            let content_type: String = row.get(2)?;
            let indexed_at: DateTime<Utc> = row.get(5)?;
            Ok(SearchLine {
                project_path: row.get(0)?,
                file_path: row.get(1)?,
                content_type: ContentType::from_name(&content_type),
                content: row.get(3)?,
                line_number: row.get::<_, i64>(4)? as usize,
                indexed_at,
            })
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let line = row?;
            if let Some(needle) = folded_needle {
                if find_offset(&line.content, needle, false).is_none() {
                    continue;
                }
            }
            lines.push(line);
        }
        Ok(lines)
    }

    pub fn append_query(&self, entry: &QueryHistoryEntry) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO query_history (query, result_count, query_type, searched_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    entry.query,
                    entry.result_count as i64,
                    entry.query_type,
                    entry.searched_at,
                ],
            )
            .context("Failed to record search query")?;
        Ok(())
    }

    /// Most recent queries first
    pub fn recent_queries(&self, limit: usize) -> Result<Vec<QueryHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT query, result_count, query_type, searched_at
            FROM query_history ORDER BY id DESC LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(QueryHistoryEntry {
                query: row.get(0)?,
                result_count: row.get::<_, i64>(1)? as usize,
                query_type: row.get(2)?,
                searched_at: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn stats(&self) -> Result<SearchStats> {
        let (lines, files, comment_lines): (i64, i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT file_path),
                   COALESCE(SUM(CASE WHEN content_type = 'comment' THEN 1 ELSE 0 END), 0)
            FROM search_lines
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let queries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM query_history", [], |row| row.get(0))?;

        Ok(SearchStats {
            lines: lines as usize,
            files: files as usize,
            code_lines: (lines - comment_lines) as usize,
            comment_lines: comment_lines as usize,
            queries: queries as usize,
        })
    }
}
