//! # Run History
//!
//! Persistent record of finished runs, successful or not.

use super::context::ShopResult;
use super::db::ShopDb;
use crate::error::PipelineError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Outcome of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// One finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub query: String,
    pub status: RunStatus,
    pub steps: u32,
    pub flow: Vec<String>,
    pub product_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn completed(id: &str, query: &str, started_at: DateTime<Utc>, result: &ShopResult) -> Self {
        Self {
            id: id.to_string(),
            query: query.to_string(),
            status: RunStatus::Completed,
            steps: result.steps,
            flow: result.flow.clone(),
            product_count: result.products.len(),
            recommended: result.recommended.as_ref().map(|p| p.name.clone()),
            error_kind: None,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Failed runs keep no partial flow or candidates
    pub fn failed(id: &str, query: &str, started_at: DateTime<Utc>, error: &PipelineError) -> Self {
        Self {
            id: id.to_string(),
            query: query.to_string(),
            status: RunStatus::Failed,
            steps: 0,
            flow: Vec::new(),
            product_count: 0,
            recommended: None,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// SQLite-backed run history
pub struct RunHistory {
    conn: Arc<Mutex<Connection>>,
}

impl RunHistory {
    pub fn new(db: &ShopDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    pub fn save(&self, record: &RunRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let flow_json = serde_json::to_string(&record.flow)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO runs
            (id, query, status, steps, flow_json, product_count, recommended,
             error_kind, error, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.id,
                record.query,
                record.status.as_str(),
                record.steps,
                flow_json,
                record.product_count as i64,
                record.recommended,
                record.error_kind,
                record.error,
                record.started_at.to_rfc3339(),
                record.finished_at.to_rfc3339(),
            ],
        )
        .context("Failed to save run")?;

        Ok(())
    }

    /// `None` when no run has this id
    pub fn load(&self, id: &str) -> Result<Option<RunRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, query, status, steps, flow_json, product_count, recommended,
                   error_kind, error, started_at, finished_at
            FROM runs WHERE id = ?1
            "#,
        )?;

        stmt.query_row(params![id], Self::row_to_record)
            .optional()
            .context("Failed to load run")
    }

    /// Most recent runs first
    pub fn list(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, query, status, steps, flow_json, product_count, recommended,
                   error_kind, error, started_at, finished_at
            FROM runs
            ORDER BY finished_at DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list runs")?;

        Ok(records)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let flow_json: String = row.get(4)?;
        let started_at: String = row.get(9)?;
        let finished_at: String = row.get(10)?;
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        Ok(RunRecord {
            id: row.get(0)?,
            query: row.get(1)?,
            status: RunStatus::from_str(&row.get::<_, String>(2)?),
            steps: row.get(3)?,
            flow: serde_json::from_str(&flow_json).unwrap_or_default(),
            product_count: row.get::<_, i64>(5)? as usize,
            recommended: row.get(6)?,
            error_kind: row.get(7)?,
            error: row.get(8)?,
            started_at: parse_time(&started_at),
            finished_at: parse_time(&finished_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::catalog::Product;

    fn sample_result() -> ShopResult {
        let product = Product::new("Kettle", 1499, "https://x/kettle");
        ShopResult {
            products: vec![product.clone()],
            recommended: Some(product),
            message: None,
            flow: vec!["Step 1: classify -> home_appliances/kettle".into()],
            steps: 1,
        }
    }

    #[test]
    fn test_save_and_load_completed() {
        let db = ShopDb::open_in_memory().unwrap();
        let history = RunHistory::new(&db);
        let record = RunRecord::completed("run-1", "kettle", Utc::now(), &sample_result());

        history.save(&record).unwrap();
        let loaded = history.load("run-1").unwrap().unwrap();

        assert_eq!(loaded.status, RunStatus::Completed);
        assert_eq!(loaded.steps, 1);
        assert_eq!(loaded.flow.len(), 1);
        assert_eq!(loaded.recommended.as_deref(), Some("Kettle"));
    }

    #[test]
    fn test_failed_run_keeps_no_partial_trail() {
        let db = ShopDb::open_in_memory().unwrap();
        let history = RunHistory::new(&db);
        let err = PipelineError::PromptTimeout {
            stage: "clarify_query",
            question_id: "q-1".into(),
        };
        history
            .save(&RunRecord::failed("run-2", "laptop", Utc::now(), &err))
            .unwrap();

        let runs = history.list(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error_kind.as_deref(), Some("prompt_timeout"));
        assert!(runs[0].flow.is_empty());
    }

    #[test]
    fn test_missing_run_is_none() {
        let db = ShopDb::open_in_memory().unwrap();
        let history = RunHistory::new(&db);
        assert!(history.load("nope").unwrap().is_none());
    }
}
