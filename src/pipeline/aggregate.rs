//! Aggregate views refreshed into the cache after each run

use crate::pipeline::AnalyzedItem;
use crate::url::SourceKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const TOP_RECENT_KEY: &str = "top-recent";
pub const SOURCE_ROLLUP_KEY: &str = "source-rollup";

const TOP_RECENT_TTL: Duration = Duration::from_secs(3600);
const SOURCE_ROLLUP_TTL: Duration = Duration::from_secs(1800);

/// A high-scoring item in the top recent view
#[derive(Debug, Clone, Serialize)]
pub struct TopRecentEntry {
    pub url: String,
    pub source_kind: SourceKind,
    pub title: Option<String>,
    pub score: f64,
    pub collected_at: Option<DateTime<Utc>>,
}

/// Per-source numbers of the rollup view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceRollup {
    pub total: u64,
    pub high_score: u64,
    pub average_score: f64,
    pub total_views: u64,
}

/// A keyed payload the cache keeps for `ttl`
#[derive(Debug, Clone, Serialize)]
pub struct AggregateView {
    pub key: String,
    #[serde(skip)]
    pub ttl: Duration,
    pub generated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl AggregateView {
    fn new(key: &str, ttl: Duration, payload: serde_json::Value) -> Self {
        Self {
            key: key.to_string(),
            ttl,
            generated_at: Utc::now(),
            payload,
        }
    }

    /// Items scoring at least `cutoff`, best first, at most `limit`
    pub fn top_recent(items: &[AnalyzedItem], cutoff: f64, limit: usize) -> Self {
        let mut entries: Vec<TopRecentEntry> = items
            .iter()
            .filter(|entry| entry.analysis.passes(cutoff))
            .map(|entry| TopRecentEntry {
                url: entry.item.url.clone(),
                source_kind: entry.item.source_kind,
                title: entry.item.title.clone(),
                score: entry.score(),
                collected_at: entry.item.provenance.as_ref().map(|p| p.collected_at),
            })
            .collect();

        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(limit);

        Self::new(TOP_RECENT_KEY, TOP_RECENT_TTL, serde_json::json!(entries))
    }

    /// Totals per source kind
    pub fn source_rollup(items: &[AnalyzedItem], cutoff: f64) -> Self {
        Self::new(SOURCE_ROLLUP_KEY, SOURCE_ROLLUP_TTL, serde_json::json!(rollup(items, cutoff)))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self.generated_at + ttl
    }
}

/// Rollup numbers keyed by source kind
pub fn rollup(items: &[AnalyzedItem], cutoff: f64) -> BTreeMap<SourceKind, SourceRollup> {
    let mut sums: BTreeMap<SourceKind, (SourceRollup, f64)> = BTreeMap::new();

    for entry in items {
        let (rollup, score_sum) = sums.entry(entry.item.source_kind).or_default();
        rollup.total += 1;
        if entry.analysis.passes(cutoff) {
            rollup.high_score += 1;
        }
        rollup.total_views += entry.item.metrics.views.unwrap_or(0);
        *score_sum += entry.score();
    }

    sums.into_iter()
        .map(|(kind, (mut rollup, score_sum))| {
            rollup.average_score = score_sum / rollup.total as f64;
            (kind, rollup)
        })
        .collect()
}
