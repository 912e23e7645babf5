//! Pipeline orchestration
//!
//! A run moves through `Idle → Fetching → Analyzing → Filtering →
//! Persisting → CacheRefresh → Idle`. At most one run is active per
//! orchestrator; every run ends with a [`PipelineRun`] summary.

mod aggregate;
mod analysis;
mod orchestrator;
mod run;
mod schedule;

pub use aggregate::{rollup, AggregateView, SourceRollup, TopRecentEntry, SOURCE_ROLLUP_KEY, TOP_RECENT_KEY};
pub use analysis::{
    analyze_item, composite_score, AnalysisResult, AnalyzedItem, Analyzer, AnalyzerError, ScoreWeights, SubScore,
};
pub use orchestrator::{
    Collaborators, OrchestratorStatus, PipelineError, PipelineOrchestrator, PipelineStats, RunTotals,
};
pub use run::{Phase, PhaseCounts, PipelineRun, RunFailure, RunStatus, SourceReport, TargetFailure};
pub use schedule::ScheduleHandle;
