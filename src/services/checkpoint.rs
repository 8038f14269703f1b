//! Durable record of processed product identifiers.
//!
//! The store is a single SQLite file. Every completion is one autocommit
//! statement, so an interrupted run loses at most the item in flight. The
//! same file caches search results per keyword and vision results per
//! image, and logs each run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::models::{ExtractedFact, FailureReason, Outcome, ProductCandidate, Stage};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    product_id TEXT PRIMARY KEY,
    outcome TEXT NOT NULL,
    stage TEXT,
    kind TEXT,
    reason TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    row_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_outcome ON items(outcome);

CREATE TABLE IF NOT EXISTS keywords (
    keyword TEXT PRIMARY KEY,
    pages INTEGER NOT NULL,
    candidates INTEGER NOT NULL,
    searched_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS candidates (
    keyword TEXT NOT NULL,
    product_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (keyword, product_id)
);

CREATE TABLE IF NOT EXISTS vision_results (
    image_url TEXT PRIMARY KEY,
    facts_json TEXT NOT NULL,
    analysed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    item_limit INTEGER NOT NULL,
    persisted INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    deferred INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    row_count INTEGER NOT NULL DEFAULT 0,
    stopped INTEGER NOT NULL DEFAULT 0,
    destination TEXT
);
"#;

/// What the store knows about one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub product_id: String,
    pub outcome: Outcome,
    pub stage: Option<Stage>,
    pub kind: Option<String>,
    pub reason: Option<String>,
    pub attempts: u32,
    pub rows: usize,
    pub updated_at: String,
}

impl ItemRecord {
    pub fn persisted(product_id: impl Into<String>, rows: usize) -> Self {
        Self {
            product_id: product_id.into(),
            outcome: Outcome::Persisted,
            stage: None,
            kind: None,
            reason: None,
            attempts: 0,
            rows,
            updated_at: now(),
        }
    }

    /// A failed item; permanent reasons are `failed`, the rest `deferred`.
    pub fn failed(product_id: impl Into<String>, stage: Stage, reason: &FailureReason) -> Self {
        let outcome = if reason.is_permanent() {
            Outcome::Failed
        } else {
            Outcome::Deferred
        };
        Self {
            product_id: product_id.into(),
            outcome,
            stage: Some(stage),
            kind: Some(reason.kind.as_str().to_string()),
            reason: Some(reason.message.clone()),
            attempts: reason.attempts,
            rows: 0,
            updated_at: now(),
        }
    }
}

/// One row of the run log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub item_limit: usize,
    pub persisted: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub rows: usize,
    pub stopped: bool,
    pub destination: Option<String>,
}

/// Totals across the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub persisted: usize,
    pub failed: usize,
    pub deferred: usize,
    pub rows: usize,
    pub keywords_cached: usize,
    pub images_analysed: usize,
    pub runs: usize,
}

struct Inner {
    conn: Connection,
    done: HashSet<String>,
}

/// SQLite-backed checkpoint store.
pub struct CheckpointStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl CheckpointStore {
    /// Open the store, creating an empty one if the file does not exist.
    ///
    /// A file that is not a usable SQLite database is reported as
    /// `CheckpointError::Corrupt`.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let corrupt = |source| CheckpointError::Corrupt {
            path: path.display().to_string(),
            source,
        };

        let conn = Connection::open(path).map_err(corrupt)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(corrupt)?;
        conn.execute_batch(SCHEMA).map_err(corrupt)?;

        let done = load_done(&conn).map_err(corrupt)?;
        tracing::debug!(path = %path.display(), done = done.len(), "checkpoint loaded");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { conn, done }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CheckpointError> {
        self.inner.lock().map_err(|_| CheckpointError::Poisoned)
    }

    /// Whether a later run should skip this identifier.
    pub fn is_done(&self, product_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.lock()?.done.contains(product_id))
    }

    /// Persist the final state of one identifier.
    ///
    /// The in-memory view only changes once the write has succeeded.
    pub fn mark_done(&self, record: &ItemRecord) -> Result<(), CheckpointError> {
        let mut inner = self.lock()?;
        upsert_item(&inner.conn, record)?;

        if record.outcome.is_done() {
            inner.done.insert(record.product_id.clone());
        } else {
            inner.done.remove(&record.product_id);
        }
        Ok(())
    }

    /// Record an identifier whose transient failures used up the retry budget.
    pub fn record_deferred(
        &self,
        product_id: &str,
        stage: Stage,
        reason: &FailureReason,
    ) -> Result<(), CheckpointError> {
        let mut record = ItemRecord::failed(product_id, stage, reason);
        record.outcome = Outcome::Deferred;
        self.mark_done(&record)
    }

    /// Drop everything known about an identifier. Returns whether it existed.
    pub fn forget(&self, product_id: &str) -> Result<bool, CheckpointError> {
        let mut inner = self.lock()?;
        let removed = inner
            .conn
            .execute("DELETE FROM items WHERE product_id = ?1", params![product_id])?;
        inner.done.remove(product_id);
        Ok(removed > 0)
    }

    /// Forget all permanent failures so the next run retries them.
    pub fn clear_failed(&self) -> Result<usize, CheckpointError> {
        let mut inner = self.lock()?;
        let removed = inner.conn.execute(
            "DELETE FROM items WHERE outcome = ?1",
            params![Outcome::Failed.as_str()],
        )?;
        inner.done = load_done(&inner.conn)?;
        Ok(removed)
    }

    /// Failed and deferred identifiers, most recent first.
    pub fn failures(&self) -> Result<Vec<ItemRecord>, CheckpointError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT product_id, outcome, stage, kind, reason, attempts, row_count, updated_at
             FROM items WHERE outcome IN ('failed', 'deferred')
             ORDER BY updated_at DESC, product_id",
        )?;
        let records = stmt
            .query_map([], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Look up a single identifier.
    pub fn get(&self, product_id: &str) -> Result<Option<ItemRecord>, CheckpointError> {
        let inner = self.lock()?;
        let record = inner
            .conn
            .query_row(
                "SELECT product_id, outcome, stage, kind, reason, attempts, row_count, updated_at
                 FROM items WHERE product_id = ?1",
                params![product_id],
                item_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn summary(&self) -> Result<CheckpointSummary, CheckpointError> {
        let inner = self.lock()?;
        let conn = &inner.conn;

        let count = |outcome: Outcome| -> Result<usize, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM items WHERE outcome = ?1",
                params![outcome.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
        };

        let rows: i64 = conn.query_row(
            "SELECT COALESCE(SUM(row_count), 0) FROM items",
            [],
            |row| row.get(0),
        )?;
        let keywords_cached: i64 =
            conn.query_row("SELECT COUNT(*) FROM keywords", [], |row| row.get(0))?;
        let images_analysed: i64 =
            conn.query_row("SELECT COUNT(*) FROM vision_results", [], |row| row.get(0))?;
        let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;

        Ok(CheckpointSummary {
            persisted: count(Outcome::Persisted)?,
            failed: count(Outcome::Failed)?,
            deferred: count(Outcome::Deferred)?,
            rows: rows as usize,
            keywords_cached: keywords_cached as usize,
            images_analysed: images_analysed as usize,
            runs: runs as usize,
        })
    }

    /// Candidates cached for a keyword, in discovery order.
    ///
    /// `None` means the keyword has never been searched, or was searched
    /// with fewer than `min_pages` result pages.
    pub fn cached_candidates(
        &self,
        keyword: &str,
        min_pages: u32,
    ) -> Result<Option<Vec<ProductCandidate>>, CheckpointError> {
        let inner = self.lock()?;
        let pages: Option<u32> = inner
            .conn
            .query_row(
                "SELECT pages FROM keywords WHERE keyword = ?1",
                params![keyword],
                |row| row.get(0),
            )
            .optional()?;
        match pages {
            None => return Ok(None),
            Some(pages) if pages < min_pages => {
                tracing::debug!(keyword, pages, min_pages, "cached search is too shallow");
                return Ok(None);
            }
            Some(_) => {}
        }

        let mut stmt = inner.conn.prepare(
            "SELECT data FROM candidates WHERE keyword = ?1 ORDER BY position, product_id",
        )?;
        let mut candidates = Vec::new();
        for data in stmt.query_map(params![keyword], |row| row.get::<_, String>(0))? {
            match serde_json::from_str::<ProductCandidate>(&data?) {
                Ok(c) => candidates.push(c),
                Err(e) => tracing::warn!(keyword, error = %e, "skipping unreadable cached candidate"),
            }
        }
        Ok(Some(candidates))
    }

    /// Replace the cached search results of a keyword.
    pub fn cache_candidates(
        &self,
        keyword: &str,
        pages: u32,
        candidates: &[ProductCandidate],
    ) -> Result<(), CheckpointError> {
        let mut inner = self.lock()?;
        let tx = inner.conn.transaction()?;
        tx.execute("DELETE FROM candidates WHERE keyword = ?1", params![keyword])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO candidates (keyword, product_id, position, data)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for candidate in candidates {
                let data = serde_json::to_string(candidate)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                stmt.execute(params![keyword, candidate.id, candidate.position, data])?;
            }
        }
        tx.execute(
            "INSERT INTO keywords (keyword, pages, candidates, searched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(keyword) DO UPDATE SET
                pages = excluded.pages,
                candidates = excluded.candidates,
                searched_at = excluded.searched_at",
            params![keyword, pages, candidates.len() as i64, now()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Facts previously read from an image, attributed to `product_id`.
    ///
    /// An empty list means the image was analysed and showed no panel.
    pub fn cached_facts(
        &self,
        image_url: &str,
        product_id: &str,
    ) -> Result<Option<Vec<ExtractedFact>>, CheckpointError> {
        let inner = self.lock()?;
        let data: Option<String> = inner
            .conn
            .query_row(
                "SELECT facts_json FROM vision_results WHERE image_url = ?1",
                params![image_url],
                |row| row.get(0),
            )
            .optional()?;
        let Some(data) = data else {
            return Ok(None);
        };

        match serde_json::from_str::<Vec<ExtractedFact>>(&data) {
            Ok(mut facts) => {
                for fact in &mut facts {
                    fact.product_id = product_id.to_string();
                }
                Ok(Some(facts))
            }
            Err(e) => {
                tracing::warn!(url = image_url, error = %e, "ignoring unreadable cached vision result");
                Ok(None)
            }
        }
    }

    /// Remember what the vision model read from an image.
    pub fn cache_facts(
        &self,
        image_url: &str,
        facts: &[ExtractedFact],
    ) -> Result<(), CheckpointError> {
        let data = serde_json::to_string(facts)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO vision_results (image_url, facts_json, analysed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(image_url) DO UPDATE SET
                facts_json = excluded.facts_json,
                analysed_at = excluded.analysed_at",
            params![image_url, data, now()],
        )?;
        Ok(())
    }

    /// Mark identifiers found in the output file but missing from the store.
    ///
    /// Covers a crash between flushing a product's rows and recording it.
    /// Returns how many identifiers were recovered.
    pub fn reconcile(&self, rows_by_id: &[(String, usize)]) -> Result<usize, CheckpointError> {
        let mut recovered = 0;
        for (id, rows) in rows_by_id {
            if self.is_done(id)? {
                continue;
            }
            let mut record = ItemRecord::persisted(id.clone(), *rows);
            record.reason = Some("recovered from output file".to_string());
            self.mark_done(&record)?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Open a run log entry and return its id.
    pub fn begin_run(&self, item_limit: usize) -> Result<i64, CheckpointError> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO runs (started_at, item_limit) VALUES (?1, ?2)",
            params![now(), item_limit as i64],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    /// Close a run log entry with its totals.
    pub fn finish_run(&self, record: &RunRecord) -> Result<(), CheckpointError> {
        let inner = self.lock()?;
        inner.conn.execute(
            "UPDATE runs SET finished_at = ?2, persisted = ?3, failed = ?4, deferred = ?5,
                skipped = ?6, row_count = ?7, stopped = ?8, destination = ?9
             WHERE id = ?1",
            params![
                record.id,
                record.finished_at.clone().unwrap_or_else(now),
                record.persisted as i64,
                record.failed as i64,
                record.deferred as i64,
                record.skipped as i64,
                record.rows as i64,
                record.stopped,
                record.destination,
            ],
        )?;
        Ok(())
    }

    /// The most recent `limit` runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, CheckpointError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT id, started_at, finished_at, item_limit, persisted, failed, deferred,
                    skipped, row_count, stopped, destination
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    item_limit: row.get::<_, i64>(3)? as usize,
                    persisted: row.get::<_, i64>(4)? as usize,
                    failed: row.get::<_, i64>(5)? as usize,
                    deferred: row.get::<_, i64>(6)? as usize,
                    skipped: row.get::<_, i64>(7)? as usize,
                    rows: row.get::<_, i64>(8)? as usize,
                    stopped: row.get(9)?,
                    destination: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

fn load_done(conn: &Connection) -> Result<HashSet<String>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT product_id FROM items WHERE outcome IN ('persisted', 'failed')")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn upsert_item(conn: &Connection, record: &ItemRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO items (product_id, outcome, stage, kind, reason, attempts, row_count, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(product_id) DO UPDATE SET
            outcome = excluded.outcome,
            stage = excluded.stage,
            kind = excluded.kind,
            reason = excluded.reason,
            attempts = excluded.attempts,
            row_count = excluded.row_count,
            updated_at = excluded.updated_at",
        params![
            record.product_id,
            record.outcome.as_str(),
            record.stage.map(|s| s.as_str()),
            record.kind,
            record.reason,
            record.attempts,
            record.rows as i64,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn item_from_row(row: &rusqlite::Row<'_>) -> Result<ItemRecord, rusqlite::Error> {
    let outcome: String = row.get(1)?;
    let stage: Option<String> = row.get(2)?;
    Ok(ItemRecord {
        product_id: row.get(0)?,
        outcome: Outcome::parse(&outcome).unwrap_or(Outcome::Failed),
        stage: stage.as_deref().and_then(Stage::parse),
        kind: row.get(3)?,
        reason: row.get(4)?,
        attempts: row.get(5)?,
        rows: row.get::<_, i64>(6)? as usize,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::open(&dir.path().join("checkpoint.sqlite")).unwrap()
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(&dir.path().join("nested/state.sqlite")).unwrap();
        assert!(!store.is_done("B000000001").unwrap());
        assert_eq!(store.summary().unwrap(), CheckpointSummary::default());
    }

    #[test]
    fn test_mark_done_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store
                .mark_done(&ItemRecord::persisted("B000000001", 4))
                .unwrap();
        }

        let store = open(&dir);
        assert!(store.is_done("B000000001").unwrap());
        assert_eq!(store.summary().unwrap().rows, 4);
    }

    #[test]
    fn test_deferred_is_not_done() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let reason = FailureReason::new(FailureKind::RetriesExhausted, "503", 3);

        store
            .record_deferred("B000000002", Stage::Detail, &reason)
            .unwrap();
        assert!(!store.is_done("B000000002").unwrap());

        let failures = store.failures().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].outcome, Outcome::Deferred);
        assert_eq!(failures[0].attempts, 3);
        assert_eq!(failures[0].stage, Some(Stage::Detail));
    }

    #[test]
    fn test_permanent_failure_is_done() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let reason = FailureReason::new(FailureKind::NotFound, "delisted", 1);

        store
            .mark_done(&ItemRecord::failed("B000000003", Stage::Detail, &reason))
            .unwrap();
        assert!(store.is_done("B000000003").unwrap());

        assert_eq!(store.clear_failed().unwrap(), 1);
        assert!(!store.is_done("B000000003").unwrap());
    }

    #[test]
    fn test_forget() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .mark_done(&ItemRecord::persisted("B000000001", 1))
            .unwrap();

        assert!(store.forget("B000000001").unwrap());
        assert!(!store.forget("B000000001").unwrap());
        assert!(!store.is_done("B000000001").unwrap());
        assert_eq!(store.get("B000000001").unwrap(), None);
    }

    #[test]
    fn test_candidate_cache() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert_eq!(store.cached_candidates("kids vitamins", 1).unwrap(), None);

        let mut first = ProductCandidate::new("B000000001", "One", "kids vitamins");
        first.position = 1;
        let mut second = ProductCandidate::new("B000000002", "Two", "kids vitamins");
        second.position = 2;
        store
            .cache_candidates("kids vitamins", 2, &[second.clone(), first.clone()])
            .unwrap();

        let cached = store.cached_candidates("kids vitamins", 2).unwrap().unwrap();
        assert_eq!(cached, vec![first, second]);
        assert_eq!(store.cached_candidates("kids vitamins", 3).unwrap(), None);

        store.cache_candidates("kids vitamins", 1, &[]).unwrap();
        assert_eq!(
            store.cached_candidates("kids vitamins", 1).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_vision_result_cache() {
        let dir = TempDir::new().unwrap();
        let url = "https://img.example/B000000001/1.jpg";
        {
            let store = open(&dir);
            assert_eq!(store.cached_facts(url, "B000000001").unwrap(), None);

            let fact = ExtractedFact {
                product_id: "B000000001".into(),
                nutrient: "Zinc".into(),
                amount: "5".into(),
                unit: "mg".into(),
                daily_value: Some("45%".into()),
                serving_size: None,
                form: None,
                age_group: None,
            };
            store.cache_facts(url, &[fact]).unwrap();
            store.cache_facts("https://img.example/blank.jpg", &[]).unwrap();
        }

        let store = open(&dir);
        let facts = store.cached_facts(url, "B000000009").unwrap().unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].nutrient, "Zinc");
        assert_eq!(facts[0].product_id, "B000000009");
        assert_eq!(
            store.cached_facts("https://img.example/blank.jpg", "B000000001").unwrap(),
            Some(Vec::new())
        );
        assert_eq!(store.summary().unwrap().images_analysed, 2);
    }

    #[test]
    fn test_reconcile_marks_missing_ids() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .mark_done(&ItemRecord::persisted("B000000001", 2))
            .unwrap();

        let recovered = store
            .reconcile(&[("B000000001".into(), 2), ("B000000002".into(), 3)])
            .unwrap();
        assert_eq!(recovered, 1);
        assert!(store.is_done("B000000002").unwrap());
        assert_eq!(store.get("B000000002").unwrap().unwrap().rows, 3);
    }

    #[test]
    fn test_run_log() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let id = store.begin_run(5).unwrap();
        store
            .finish_run(&RunRecord {
                id,
                persisted: 3,
                failed: 1,
                rows: 12,
                destination: Some("drive:abc".into()),
                ..Default::default()
            })
            .unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].item_limit, 5);
        assert_eq!(runs[0].persisted, 3);
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].destination.as_deref(), Some("drive:abc"));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.sqlite");
        std::fs::write(&path, "definitely not a database ".repeat(64)).unwrap();

        let err = CheckpointStore::open(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }
}
