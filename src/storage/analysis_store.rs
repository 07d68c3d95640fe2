//! Analysis store: one row per issue

use super::{escape_like_pattern, open_existing, open_store, StoreKind};
use crate::analysis::{AnalysisIssue, IssueType, Severity};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Issue totals per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

pub struct AnalysisStore {
    conn: Connection,
}

const ISSUE_COLUMNS: &str =
    "id, issue_type, severity, file, line, column, message, description, suggestion, rule, created_at";

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisIssue> {
    let issue_type: String = row.get(1)?;
    let severity: String = row.get(2)?;
    Ok(AnalysisIssue {
        id: row.get(0)?,
        issue_type: IssueType::from_name(&issue_type),
        severity: Severity::from_name(&severity),
        file: row.get(3)?,
        line: row.get::<_, i64>(4)? as usize,
        column: row.get::<_, Option<i64>>(5)?.map(|c| c as usize),
        message: row.get(6)?,
        description: row.get(7)?,
        suggestion: row.get(8)?,
        rule: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl AnalysisStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_store(path, StoreKind::Analysis)?,
        })
    }

    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        Ok(open_existing(path, StoreKind::Analysis)?.map(|conn| Self { conn }))
    }

    /// Bring the stored issues for a scope in line with a fresh analysis
    ///
    /// Issues are upserted by id. Ids a file no longer produces are deleted,
    /// as are rows for files under `scope` that were not analyzed at all.
    /// `None` means the whole project.
    pub fn sync(
        &mut self,
        scope: Option<&str>,
        analyzed: &BTreeMap<String, Vec<AnalysisIssue>>,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start analysis transaction")?;

        {
            let mut upsert = tx.prepare(&format!(
                r#"
                INSERT INTO issues ({})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    issue_type = excluded.issue_type,
                    severity = excluded.severity,
                    column = excluded.column,
                    message = excluded.message,
                    description = excluded.description,
                    suggestion = excluded.suggestion
                "#,
                ISSUE_COLUMNS
            ))?;
            let mut ids_for_file = tx.prepare("SELECT id FROM issues WHERE file = ?1")?;
            let mut delete = tx.prepare("DELETE FROM issues WHERE id = ?1")?;

            for (file, issues) in analyzed {
                for issue in issues {
                    upsert.execute(params![
                        issue.id,
                        issue.issue_type.to_string(),
                        issue.severity.to_string(),
                        issue.file,
                        issue.line as i64,
                        issue.column.map(|c| c as i64),
                        issue.message,
                        issue.description,
                        issue.suggestion,
                        issue.rule,
                        issue.created_at,
                    ])?;
                }

                let current: HashSet<&str> = issues.iter().map(|i| i.id.as_str()).collect();
                let stored: Vec<String> = ids_for_file
                    .query_map(params![file], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                for id in stored.iter().filter(|id| !current.contains(id.as_str())) {
                    delete.execute(params![id])?;
                }
            }

            let in_scope: Vec<String> = match scope {
                Some(scope) => {
                    let mut stmt = tx.prepare(
                        r#"SELECT DISTINCT file FROM issues WHERE file = ?1 OR file LIKE ?2 ESCAPE '\'"#,
                    )?;
                    let pattern = format!("{}/%", escape_like_pattern(scope));
                    let files = stmt
                        .query_map(params![scope, pattern], |row| row.get(0))?
                        .collect::<rusqlite::Result<_>>()?;
                    files
                }
                None => {
                    let mut stmt = tx.prepare("SELECT DISTINCT file FROM issues")?;
                    let files = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<rusqlite::Result<_>>()?;
                    files
                }
            };

            for file in in_scope.iter().filter(|f| !analyzed.contains_key(*f)) {
                debug!(file = %file, "Dropping issues for file no longer analyzed");
                tx.execute("DELETE FROM issues WHERE file = ?1", params![file])?;
            }
        }

        tx.commit().context("Failed to commit analysis results")?;
        Ok(())
    }

    /// Every issue, ordered by file, line and rule
    pub fn all_issues(&self) -> Result<Vec<AnalysisIssue>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM issues ORDER BY file, line, rule",
            ISSUE_COLUMNS
        ))?;
        let issues = stmt
            .query_map([], issue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issues)
    }

    /// Issues whose id is in `ids`, ordered by file, line and rule
    pub fn issues_by_ids(&self, ids: &[String]) -> Result<Vec<AnalysisIssue>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .all_issues()?
            .into_iter()
            .filter(|issue| wanted.contains(issue.id.as_str()))
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .context("Failed to count issues")?;
        Ok(count as usize)
    }

    pub fn count_by_severity(&self) -> Result<SeverityCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT severity, COUNT(*) FROM issues GROUP BY severity")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;

        let mut counts = SeverityCounts::default();
        for row in rows {
            let (severity, n) = row?;
            match Severity::from_name(&severity) {
                Severity::High => counts.high += n,
                Severity::Medium => counts.medium += n,
                Severity::Low => counts.low += n,
            }
            counts.total += n;
        }
        Ok(counts)
    }
}
