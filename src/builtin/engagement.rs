//! Engagement analyzer
//!
//! Scores an item from the counters its source reported. With a view count
//! the score follows the engagement rate (interactions per view); without
//! one it falls back to the absolute interaction volume on a log scale,
//! at lower confidence.

use crate::pipeline::{Analyzer, AnalyzerError, SubScore};
use crate::queue::ContentItem;
use async_trait::async_trait;

/// Engagement rate that earns a full score
const FULL_SCORE_RATE: f64 = 0.10;

/// Interactions that earn a full score when views are unknown
const FULL_SCORE_INTERACTIONS: f64 = 100_000.0;

#[derive(Debug, Clone)]
pub struct EngagementAnalyzer {
    full_score_rate: f64,
}

impl EngagementAnalyzer {
    pub fn new() -> Self {
        Self {
            full_score_rate: FULL_SCORE_RATE,
        }
    }

    /// Uses a different engagement rate for a full score
    pub fn with_full_score_rate(rate: f64) -> Self {
        Self {
            full_score_rate: rate.max(f64::EPSILON),
        }
    }
}

impl Default for EngagementAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for EngagementAnalyzer {
    fn name(&self) -> &str {
        "engagement"
    }

    fn applies_to(&self, item: &ContentItem) -> bool {
        !item.metrics.is_empty()
    }

    async fn analyze(&self, item: &ContentItem) -> Result<SubScore, AnalyzerError> {
        let metrics = &item.metrics;
        if metrics.is_empty() {
            return Err(AnalyzerError::MissingInput("no engagement metrics".to_string()));
        }

        let interactions = metrics.interactions() as f64;

        match metrics.views {
            Some(views) if views > 0 => {
                let rate = interactions / views as f64;
                Ok(SubScore::new(rate / self.full_score_rate * 100.0, 0.9))
            }
            _ => {
                let volume = (interactions + 1.0).log10() / (FULL_SCORE_INTERACTIONS + 1.0).log10();
                Ok(SubScore::new(volume * 100.0, 0.5))
            }
        }
    }
}
