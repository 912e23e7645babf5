//! Storage and cache contracts
//!
//! The pipeline only needs two narrow operations from its backends: persist
//! one analyzed item, and refresh one aggregate view.

use crate::pipeline::{AggregateView, AnalysisResult};
use crate::queue::ContentItem;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors of a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable destination of analyzed items
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores an item with its analysis
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Identifier of the stored item
    /// * `Err(StorageError)` - The item was not stored
    async fn persist(&self, item: &ContentItem, analysis: &AnalysisResult) -> StorageResult<String>;
}

/// Best-effort store of aggregate views
#[async_trait]
pub trait Cache: Send + Sync {
    async fn refresh(&self, view: &AggregateView) -> Result<(), CacheError>;
}
