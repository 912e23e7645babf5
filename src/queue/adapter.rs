//! Source adapters and the content they produce

use crate::fetch::{ErrorKind, FetchOutcome, FetchSession, NavigationError};
use crate::queue::CrawlTarget;
use crate::url::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Engagement counters reported by a source, when it exposes them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
}

impl EngagementMetrics {
    pub fn is_empty(&self) -> bool {
        self.views.is_none() && self.likes.is_none() && self.comments.is_none() && self.shares.is_none()
    }

    /// Likes, comments and shares combined
    pub fn interactions(&self) -> u64 {
        [self.likes, self.comments, self.shares].iter().flatten().sum()
    }
}

/// Where and how an item was collected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub collected_at: DateTime<Utc>,
    pub source_kind: SourceKind,
    pub processing_time_ms: u64,
    pub original_url: String,
    pub normalized_url: String,
}

/// Payload returned by a source adapter
///
/// The core only reads the fields analyzers care about; anything
/// source-specific lives in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub source_kind: SourceKind,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub metrics: EngagementMetrics,
    #[serde(default)]
    pub extra: serde_json::Value,
    pub provenance: Option<Provenance>,
}

impl ContentItem {
    pub fn new(source_kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            source_kind,
            url: url.into(),
            title: None,
            description: None,
            media_urls: Vec::new(),
            hashtags: Vec::new(),
            metrics: EngagementMetrics::default(),
            extra: serde_json::Value::Null,
            provenance: None,
        }
    }

    pub fn has_text(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

/// Why an adapter produced no item
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Fetch failed after {attempts} attempt(s): {kind}")]
    Fetch {
        kind: ErrorKind,
        attempts: u32,
        message: Option<String>,
    },

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("No adapter registered for {0}")]
    Unregistered(SourceKind),
}

impl AdapterError {
    /// Converts a failed final outcome
    pub fn from_outcome(outcome: FetchOutcome) -> Self {
        Self::Fetch {
            kind: outcome.error_kind.unwrap_or(ErrorKind::NetworkError),
            attempts: outcome.attempt,
            message: outcome.message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { kind, .. } => *kind,
            Self::Navigation(e) => e.kind(),
            Self::Extraction(_) | Self::Unregistered(_) => ErrorKind::ElementNotFound,
        }
    }
}

/// Per-source extraction capability
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches one target through the session and extracts its content
    async fn fetch(&self, target: &CrawlTarget, session: &mut FetchSession) -> Result<ContentItem, AdapterError>;
}

/// Mapping from source kind to adapter, populated at startup
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// Registers one adapter for every known source
    pub fn register_all(&mut self, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        for kind in SourceKind::all() {
            self.adapters.insert(kind, Arc::clone(&adapter));
        }
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered kinds with their adapter names, sorted by kind
    pub fn describe(&self) -> Vec<(SourceKind, String)> {
        let mut entries: Vec<(SourceKind, String)> = self
            .adapters
            .iter()
            .map(|(kind, adapter)| (*kind, adapter.name().to_string()))
            .collect();
        entries.sort();
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
