//! Analyzer contract and composite scoring

use crate::queue::ContentItem;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Score reported by one analyzer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    /// 0..=100
    pub score: f64,
    /// 0..=1
    pub confidence: f64,
}

impl SubScore {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score: score.clamp(0.0, 100.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analyzer failed: {0}")]
    Failed(String),

    #[error("Item lacks the fields this analyzer needs: {0}")]
    MissingInput(String),

    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),
}

/// A content-understanding capability scoring one aspect of an item
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name used for weights and in failure reports
    fn name(&self) -> &str;

    /// Whether the item has the fields this analyzer reads
    fn applies_to(&self, item: &ContentItem) -> bool;

    async fn analyze(&self, item: &ContentItem) -> Result<SubScore, AnalyzerError>;
}

/// Weight per analyzer name; unknown analyzers weigh 1.0
#[derive(Debug, Clone, Default)]
pub struct ScoreWeights {
    weights: HashMap<String, f64>,
}

impl ScoreWeights {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self { weights }
    }

    pub fn weight(&self, analyzer: &str) -> f64 {
        self.weights.get(analyzer).copied().unwrap_or(1.0)
    }
}

/// Sub-scores and failures of one item
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResult {
    pub sub_scores: BTreeMap<String, SubScore>,
    /// Analyzer name to failure reason
    pub failures: BTreeMap<String, String>,
    /// Weighted mean of the successful sub-scores
    pub composite: Option<f64>,
    /// Mean confidence of the successful analyzers
    pub confidence: Option<f64>,
}

impl AnalysisResult {
    /// Whether any applicable analyzer failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn has_score(&self) -> bool {
        self.composite.is_some()
    }

    /// Whether the item reaches the threshold; unscored items never do
    pub fn passes(&self, threshold: f64) -> bool {
        self.composite.is_some_and(|score| score >= threshold)
    }
}

/// An item with its analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedItem {
    pub item: ContentItem,
    pub analysis: AnalysisResult,
}

impl AnalyzedItem {
    pub fn score(&self) -> f64 {
        self.analysis.composite.unwrap_or(0.0)
    }
}

/// Weighted mean over the sub-scores present
///
/// Missing analyzers are left out of both sums, so they never count as
/// zero. Returns `None` when nothing with a positive weight is present.
///
/// # Example
///
/// ```ignore
/// // visual 80, copy missing, hooks 60, equal weights
/// assert_eq!(composite_score(&scores, &ScoreWeights::default()), Some(70.0));
/// ```
pub fn composite_score(sub_scores: &BTreeMap<String, SubScore>, weights: &ScoreWeights) -> Option<f64> {
    let (weighted, total) = sub_scores
        .iter()
        .fold((0.0, 0.0), |(weighted, total), (name, sub)| {
            let weight = weights.weight(name);
            (weighted + sub.score * weight, total + weight)
        });

    if total > 0.0 {
        Some(weighted / total)
    } else {
        None
    }
}

fn mean_confidence(sub_scores: &BTreeMap<String, SubScore>) -> Option<f64> {
    if sub_scores.is_empty() {
        return None;
    }
    Some(sub_scores.values().map(|sub| sub.confidence).sum::<f64>() / sub_scores.len() as f64)
}

/// Runs every applicable analyzer on the item concurrently
pub async fn analyze_item(item: &ContentItem, analyzers: &[Arc<dyn Analyzer>], weights: &ScoreWeights) -> AnalysisResult {
    let applicable: Vec<&Arc<dyn Analyzer>> = analyzers.iter().filter(|a| a.applies_to(item)).collect();

    let results = join_all(applicable.iter().map(|analyzer| analyzer.analyze(item))).await;

    let mut analysis = AnalysisResult::default();
    for (analyzer, result) in applicable.iter().zip(results) {
        match result {
            Ok(sub) => {
                analysis.sub_scores.insert(analyzer.name().to_string(), sub);
            }
            Err(e) => {
                tracing::warn!("Analyzer {} failed on {}: {}", analyzer.name(), item.url, e);
                analysis.failures.insert(analyzer.name().to_string(), e.to_string());
            }
        }
    }

    analysis.composite = composite_score(&analysis.sub_scores, weights);
    analysis.confidence = mean_confidence(&analysis.sub_scores);
    analysis
}
