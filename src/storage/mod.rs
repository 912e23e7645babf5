//! Storage module for persisting harvested content
//!
//! This module handles all database operations, including:
//! - The `ContentStore` and `Cache` contracts the pipeline writes through
//! - A SQLite backend implementing both
//! - Run records and stored statistics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Cache, CacheError, ContentStore, StorageError, StorageResult};

use crate::pipeline::{PhaseCounts, RunStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Opens or creates a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}

/// A stored run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub config_hash: String,
    pub counts: PhaseCounts,
    pub failures: u64,
}

/// A stored item with its current composite score
#[derive(Debug, Clone, Serialize)]
pub struct StoredItem {
    pub url: String,
    pub source_kind: String,
    pub title: Option<String>,
    pub composite: Option<f64>,
}

/// Totals over the whole database
#[derive(Debug, Clone, Serialize)]
pub struct StoredStats {
    pub total_items: u64,
    pub total_runs: u64,
    pub items_by_source: BTreeMap<String, u64>,
    pub best_items: Vec<StoredItem>,
    pub average_score: Option<f64>,
    pub latest_run: Option<RunRecord>,
}
