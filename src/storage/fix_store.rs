//! Fixes store: one row per resolved issue

use super::{open_existing, open_store, StoreKind};
use crate::fix::{FixHistorySummary, FixRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct FixStore {
    conn: Connection,
}

impl FixStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_store(path, StoreKind::Fixes)?,
        })
    }

    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        Ok(open_existing(path, StoreKind::Fixes)?.map(|conn| Self { conn }))
    }

    /// Append the records of one run
    pub fn record(&mut self, records: &[FixRecord]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start fix history transaction")?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO fix_history (run_id, issue_id, file, rule, backup_created, backup_path, success, fixed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.run_id,
                    record.issue_id,
                    record.file,
                    record.rule,
                    record.backup_created,
                    record.backup_path,
                    record.success,
                    record.fixed_at,
                ])?;
            }
        }

        tx.commit().context("Failed to commit fix history")?;
        Ok(())
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<FixRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT run_id, issue_id, file, rule, backup_created, backup_path, success, fixed_at
            FROM fix_history ORDER BY id DESC LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(FixRecord {
                    run_id: row.get(0)?,
                    issue_id: row.get(1)?,
                    file: row.get(2)?,
                    rule: row.get(3)?,
                    backup_created: row.get(4)?,
                    backup_path: row.get(5)?,
                    success: row.get(6)?,
                    fixed_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM fix_history WHERE success = 1",
                [],
                |row| row.get(0),
            )
            .context("Failed to count fixes")?;
        Ok(count as usize)
    }

    pub fn last_fix_at(&self) -> Result<Option<DateTime<Utc>>> {
        let last = self
            .conn
            .query_row(
                "SELECT fixed_at FROM fix_history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last)
    }

    pub fn summary(&self) -> Result<FixHistorySummary> {
        let total_fixes = self.count()?;
        let total_runs: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT run_id) FROM fix_history",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT rule, COUNT(*) FROM fix_history WHERE success = 1 GROUP BY rule ORDER BY rule",
        )?;
        let by_rule = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let total_runs = total_runs as usize;
        Ok(FixHistorySummary {
            total_fixes,
            total_runs,
            average_per_run: if total_runs == 0 {
                0.0
            } else {
                total_fixes as f64 / total_runs as f64
            },
            last_fix_at: self.last_fix_at()?,
            by_rule,
        })
    }
}
