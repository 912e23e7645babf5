//! Crawl targets and submission validation

use crate::url::{identify_source, infer_content_kind, normalize_url, ContentKind, PriorityWeights, SourceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use url::Url;

/// A normalized, prioritized unit of crawl work
#[derive(Debug, Clone, Serialize)]
pub struct CrawlTarget {
    /// Input exactly as submitted
    pub raw_input: String,
    pub normalized_url: Url,
    pub source_kind: SourceKind,
    pub content_kind: ContentKind,

    /// Ordering key only; higher drains first
    pub priority: i64,
    pub added_at: DateTime<Utc>,

    /// Submission order, breaks priority ties
    pub sequence: u64,
}

impl CrawlTarget {
    /// Normalizes and classifies a raw input
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlTarget)` - The input names a supported source
    /// * `Err(RejectionReason)` - Malformed URL or unknown source
    pub fn prepare(raw_input: &str, weights: &PriorityWeights, sequence: u64) -> Result<Self, RejectionReason> {
        let normalized_url =
            normalize_url(raw_input).map_err(|e| RejectionReason::Malformed(e.to_string()))?;

        let source_kind = identify_source(&normalized_url).ok_or(RejectionReason::UnsupportedSource)?;
        let content_kind = infer_content_kind(&normalized_url, source_kind);

        Ok(Self {
            raw_input: raw_input.to_string(),
            priority: weights.priority(source_kind, content_kind),
            normalized_url,
            source_kind,
            content_kind,
            added_at: Utc::now(),
            sequence,
        })
    }

    pub fn key(&self) -> &str {
        self.normalized_url.as_str()
    }
}

/// Why a raw input was not queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum RejectionReason {
    Malformed(String),
    UnsupportedSource,
    /// Same normalized URL as a pending or in-flight target
    Duplicate,
}

/// Rejection reason without its detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    Malformed,
    UnsupportedSource,
    Duplicate,
}

impl RejectionReason {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::Malformed(_) => RejectionKind::Malformed,
            Self::UnsupportedSource => RejectionKind::UnsupportedSource,
            Self::Duplicate => RejectionKind::Duplicate,
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed: {}", detail),
            Self::UnsupportedSource => f.write_str("unsupported source"),
            Self::Duplicate => f.write_str("duplicate"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub raw_input: String,
    pub reason: RejectionReason,
}

/// Result of one `submit` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub accepted: Vec<CrawlTarget>,
    pub rejected: Vec<Rejection>,
}

impl ValidationReport {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Number of rejections of the given kind
    pub fn rejected_for(&self, kind: RejectionKind) -> usize {
        self.rejected
            .iter()
            .filter(|rejection| rejection.reason.kind() == kind)
            .count()
    }
}
