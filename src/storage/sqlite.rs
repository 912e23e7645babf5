//! SQLite storage implementation
//!
//! One connection behind a mutex serves as both the content store and the
//! cache. Runs are recorded by the caller once they finish.

use crate::pipeline::{AggregateView, AnalysisResult, PhaseCounts, PipelineRun, RunStatus};
use crate::queue::ContentItem;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Cache, CacheError, ContentStore, StorageError, StorageResult};
use crate::storage::{RunRecord, StoredItem, StoredStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite backend for items, analyses, runs and cached views
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::debug!("Opened database {}", path.display());

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a finished run together with the hash of the config it ran with
    pub fn record_run(&self, run: &PipelineRun, config_hash: &str) -> StorageResult<()> {
        let summary = serde_json::to_string(run)?;
        let conn = self.lock();

        conn.execute(
            "INSERT OR REPLACE INTO runs (
                id, started_at, finished_at, status, phase, config_hash,
                fetched, analyzed, filtered_in, filtered_out, persisted, failures,
                cache_views_written, cache_views_failed, fatal_reason, summary
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                run.id.to_string(),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.status.to_db_string(),
                run.phase.as_str(),
                config_hash,
                run.counts.fetched as i64,
                run.counts.analyzed as i64,
                run.counts.filtered_in as i64,
                run.counts.filtered_out as i64,
                run.counts.persisted as i64,
                run.failure_count() as i64,
                run.cache_views_written as i64,
                run.cache_views_failed as i64,
                run.fatal_reason,
                summary,
            ],
        )?;

        tracing::debug!("Recorded run {}", run.id);
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> StorageResult<RunRecord> {
        let conn = self.lock();
        conn.query_row(&format!("{} WHERE id = ?1", RUN_SELECT), params![id], run_from_row)
            .optional()?
            .ok_or_else(|| StorageError::RunNotFound(id.to_string()))
    }

    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock();
        let run = conn
            .query_row(&format!("{} ORDER BY started_at DESC LIMIT 1", RUN_SELECT), [], run_from_row)
            .optional()?;
        Ok(run)
    }

    /// Payload of a cached view, unless it has expired
    pub fn cached_view(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let conn = self.lock();
        let entry: Option<(String, String)> = conn
            .query_row(
                "SELECT payload, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, expires_at)) = entry else {
            return Ok(None);
        };

        let expired = DateTime::parse_from_rfc3339(&expires_at)
            .map(|expiry| expiry.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);
        if expired {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&payload)?))
    }

    pub fn count_items(&self) -> StorageResult<u64> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Totals over everything stored, with the `limit` best items
    pub fn stored_stats(&self, limit: usize) -> StorageResult<StoredStats> {
        let latest_run = self.latest_run()?;
        let conn = self.lock();

        let total_items: i64 = conn.query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
        let total_runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;

        let mut stmt =
            conn.prepare("SELECT source_kind, COUNT(*) FROM content_items GROUP BY source_kind ORDER BY source_kind")?;
        let items_by_source = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<BTreeMap<String, u64>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT i.url, i.source_kind, i.title, a.composite
             FROM content_items i
             JOIN content_analysis a ON a.item_id = i.id
             WHERE a.id = (SELECT MAX(id) FROM content_analysis WHERE item_id = i.id)
             ORDER BY a.composite DESC
             LIMIT ?1",
        )?;
        let best_items = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredItem {
                    url: row.get(0)?,
                    source_kind: row.get(1)?,
                    title: row.get(2)?,
                    composite: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let average_score: Option<f64> = conn.query_row(
            "SELECT AVG(a.composite)
             FROM content_analysis a
             WHERE a.id IN (SELECT MAX(id) FROM content_analysis GROUP BY item_id)",
            [],
            |row| row.get(0),
        )?;

        Ok(StoredStats {
            total_items: total_items as u64,
            total_runs: total_runs as u64,
            items_by_source,
            best_items,
            average_score,
            latest_run,
        })
    }

    fn upsert_item(conn: &Connection, item: &ContentItem) -> StorageResult<i64> {
        let provenance = item.provenance.as_ref();

        conn.execute(
            "INSERT INTO content_items (
                url, source_kind, title, description, media_urls, hashtags,
                views, likes, comments, shares, extra, original_url, collected_at,
                processing_time_ms, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                media_urls = excluded.media_urls,
                hashtags = excluded.hashtags,
                views = excluded.views,
                likes = excluded.likes,
                comments = excluded.comments,
                shares = excluded.shares,
                extra = excluded.extra,
                collected_at = excluded.collected_at,
                processing_time_ms = excluded.processing_time_ms,
                updated_at = excluded.updated_at",
            params![
                item.url,
                item.source_kind.as_str(),
                item.title,
                item.description,
                serde_json::to_string(&item.media_urls)?,
                serde_json::to_string(&item.hashtags)?,
                item.metrics.views.map(|v| v as i64),
                item.metrics.likes.map(|v| v as i64),
                item.metrics.comments.map(|v| v as i64),
                item.metrics.shares.map(|v| v as i64),
                serde_json::to_string(&item.extra)?,
                provenance.map(|p| p.original_url.clone()),
                provenance.map(|p| p.collected_at.to_rfc3339()),
                provenance.map(|p| p.processing_time_ms as i64),
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = conn.query_row("SELECT id FROM content_items WHERE url = ?1", params![item.url], |row| {
            row.get(0)
        })?;
        Ok(id)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn persist(&self, item: &ContentItem, analysis: &AnalysisResult) -> StorageResult<String> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let item_id = Self::upsert_item(&tx, item)?;
        tx.execute(
            "INSERT INTO content_analysis (item_id, composite, confidence, partial, sub_scores, failures, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item_id,
                analysis.composite,
                analysis.confidence,
                analysis.is_partial(),
                serde_json::to_string(&analysis.sub_scores)?,
                serde_json::to_string(&analysis.failures)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(item_id.to_string())
    }
}

#[async_trait]
impl Cache for SqliteStore {
    async fn refresh(&self, view: &AggregateView) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&view.payload)?;
        let conn = self.lock();

        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, payload, generated_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                view.key,
                payload,
                view.generated_at.to_rfc3339(),
                view.expires_at().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

const RUN_SELECT: &str = "SELECT id, started_at, finished_at, status, config_hash,
    fetched, analyzed, filtered_in, filtered_out, persisted, failures FROM runs";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(3)?).unwrap_or(RunStatus::Running),
        config_hash: row.get(4)?,
        counts: PhaseCounts {
            fetched: row.get::<_, i64>(5)? as u64,
            analyzed: row.get::<_, i64>(6)? as u64,
            filtered_in: row.get::<_, i64>(7)? as u64,
            filtered_out: row.get::<_, i64>(8)? as u64,
            persisted: row.get::<_, i64>(9)? as u64,
        },
        failures: row.get::<_, i64>(10)? as u64,
    })
}
