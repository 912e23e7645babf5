//! Pipeline orchestrator
//!
//! Runs fetch → analyze → filter → persist → cache refresh over the
//! configured sources. Failures are recovered inside their phase and end up
//! as counts and bounded failure entries on the [`PipelineRun`]; the only
//! error returned is [`PipelineError::RunAlreadyActive`].

use crate::config::{Config, PipelineConfig, QueueConfig, SourceEntry};
use crate::fetch::{FetchController, FetchStats, SurfaceFactory};
use crate::identity::PoolStats;
use crate::pipeline::{
    analyze_item, AggregateView, AnalyzedItem, Analyzer, Phase, PipelineRun, RunStatus, ScoreWeights, SourceReport,
    TargetFailure,
};
use crate::queue::{parse_link_file, AdapterRegistry, ContentItem, CrawlQueue, TargetResult};
use crate::storage::{Cache, ContentStore};
use crate::url::SourceKind;
use futures::future::join_all;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run {0} is still active")]
    RunAlreadyActive(Uuid),
}

/// Everything a run delegates to
pub struct Collaborators {
    pub adapters: Arc<AdapterRegistry>,
    pub controller: Arc<FetchController>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub analyzers: Vec<Arc<dyn Analyzer>>,
    pub store: Arc<dyn ContentStore>,
    pub cache: Arc<dyn Cache>,
}

/// What the orchestrator is doing right now
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub active: bool,
    pub run_id: Option<Uuid>,
    pub phase: Phase,
    pub adapters: Vec<(SourceKind, String)>,
    pub analyzers: Vec<String>,
    pub last_run: Option<PipelineRun>,
}

/// Run counters since the orchestrator was created
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunTotals {
    pub started: u64,
    pub completed: u64,
    pub fatal: u64,
    pub stopped: u64,
    /// Requests turned away because a run was active
    pub rejected: u64,
    pub fetched: u64,
    pub persisted: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub runs: RunTotals,
    pub fetch: FetchStats,
    pub identities: PoolStats,
}

struct ActiveRun {
    id: Uuid,
    phase: Phase,
}

#[derive(Default)]
struct OrchestratorState {
    active: Option<ActiveRun>,
    last_run: Option<PipelineRun>,
    /// Queues of the fetch phase in progress
    queues: Vec<CrawlQueue>,
    totals: RunTotals,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    queue_config: QueueConfig,
    weights: ScoreWeights,
    parts: Collaborators,
    state: Mutex<OrchestratorState>,
    stop: AtomicBool,
}

/// Clears the active run when the run ends, however it ends
struct RunGuard<'a> {
    orchestrator: &'a PipelineOrchestrator,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.orchestrator.lock();
        state.active = None;
        state.queues.clear();
    }
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, queue_config: QueueConfig, parts: Collaborators) -> Self {
        let weights = ScoreWeights::new(config.weights.clone());
        Self {
            config,
            queue_config,
            weights,
            parts,
            state: Mutex::new(OrchestratorState::default()),
            stop: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, parts: Collaborators) -> Self {
        Self::new(config.pipeline.clone(), config.queue.clone(), parts)
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline over the configured sources
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineRun)` - The finished run, including fatal and stopped ones
    /// * `Err(PipelineError::RunAlreadyActive)` - Another run holds the orchestrator
    pub async fn run_full_pipeline(&self) -> Result<PipelineRun, PipelineError> {
        let sources = self.config.sources.clone();
        self.run_sources(&sources).await
    }

    /// Runs the pipeline over the given sources instead of the configured ones
    pub async fn run_sources(&self, sources: &[SourceEntry]) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(self.config.max_failures);
        let _guard = self.begin(run.id)?;
        self.stop.store(false, Ordering::SeqCst);

        tracing::info!("Pipeline run {} started with {} sources", run.id, sources.len());
        self.execute(&mut run, sources).await;

        tracing::info!(
            "Pipeline run {} {}: fetched {}, analyzed {}, kept {}, dropped {}, persisted {}, {} failures",
            run.id,
            run.status.to_db_string(),
            run.counts.fetched,
            run.counts.analyzed,
            run.counts.filtered_in,
            run.counts.filtered_out,
            run.counts.persisted,
            run.failure_count()
        );

        self.complete(&run);
        Ok(run)
    }

    /// Requests a stop at the next batch or phase boundary
    pub fn stop(&self) {
        let state = self.lock();
        if state.active.is_none() {
            return;
        }

        tracing::info!("Pipeline stop requested");
        self.stop.store(true, Ordering::SeqCst);
        for queue in &state.queues {
            queue.stop();
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.lock();
        OrchestratorStatus {
            active: state.active.is_some(),
            run_id: state.active.as_ref().map(|active| active.id),
            phase: state.active.as_ref().map_or(Phase::Idle, |active| active.phase),
            adapters: self.parts.adapters.describe(),
            analyzers: self.parts.analyzers.iter().map(|a| a.name().to_string()).collect(),
            last_run: state.last_run.clone(),
        }
    }

    pub fn last_run(&self) -> Option<PipelineRun> {
        self.lock().last_run.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            runs: self.lock().totals,
            fetch: self.parts.controller.stats(),
            identities: self.parts.controller.identities().stats(),
        }
    }

    fn begin(&self, id: Uuid) -> Result<RunGuard<'_>, PipelineError> {
        let mut state = self.lock();

        if let Some((active_id, phase)) = state.active.as_ref().map(|active| (active.id, active.phase)) {
            state.totals.rejected += 1;
            tracing::warn!("Run rejected: run {} is still {}", active_id, phase);
            return Err(PipelineError::RunAlreadyActive(active_id));
        }

        state.active = Some(ActiveRun { id, phase: Phase::Idle });
        state.totals.started += 1;
        Ok(RunGuard { orchestrator: self })
    }

    fn complete(&self, run: &PipelineRun) {
        let mut state = self.lock();
        match run.status {
            RunStatus::Completed => state.totals.completed += 1,
            RunStatus::Fatal => state.totals.fatal += 1,
            RunStatus::Stopped => state.totals.stopped += 1,
            RunStatus::Running => {}
        }
        state.totals.fetched += run.counts.fetched;
        state.totals.persisted += run.counts.persisted;
        state.last_run = Some(run.clone());
    }

    fn enter(&self, run: &mut PipelineRun, phase: Phase) {
        run.phase = phase;
        if let Some(active) = self.lock().active.as_mut() {
            active.phase = phase;
        }
        tracing::info!("Run {}: {}", run.id, phase);
    }

    /// Finishes the run as stopped if a stop was requested
    fn stopped(&self, run: &mut PipelineRun) -> bool {
        if !self.stop.load(Ordering::SeqCst) {
            return false;
        }

        tracing::info!("Run {} stopped after {}", run.id, run.phase);
        run.finish(RunStatus::Stopped);
        true
    }

    async fn execute(&self, run: &mut PipelineRun, sources: &[SourceEntry]) {
        self.enter(run, Phase::Fetching);
        if sources.is_empty() {
            tracing::error!("Run {} has no sources", run.id);
            run.mark_fatal("no sources configured");
            return;
        }

        let fetched = self.fetch_phase(run, sources).await;
        if !run.sources.iter().any(SourceReport::attempted) {
            tracing::error!("Run {}: no source had a valid target", run.id);
            run.mark_fatal("no source had a valid target");
            return;
        }
        if self.stopped(run) {
            return;
        }

        self.enter(run, Phase::Analyzing);
        let analyzed = self.analyze_phase(run, fetched).await;
        if self.stopped(run) {
            return;
        }

        self.enter(run, Phase::Filtering);
        let kept = self.filter_phase(run, analyzed);
        if self.stopped(run) {
            return;
        }

        self.enter(run, Phase::Persisting);
        let persisted = self.persist_phase(run, kept).await;
        if self.stopped(run) {
            return;
        }

        self.enter(run, Phase::CacheRefresh);
        self.cache_phase(run, &persisted).await;

        run.finish(RunStatus::Completed);
    }

    /// Fetches every source concurrently; sources never affect each other
    async fn fetch_phase(&self, run: &mut PipelineRun, sources: &[SourceEntry]) -> Vec<ContentItem> {
        let results = join_all(sources.iter().map(|source| self.fetch_source(source))).await;

        let mut items = Vec::new();
        for (report, source_items) in results {
            if let Some(summary) = report.failure_summary() {
                tracing::warn!("Source {}: {}", report.name, summary);
                run.record_failure(Phase::Fetching, report.name.clone(), summary);
            }

            tracing::info!(
                "Source {}: {} fetched, {} failed, {} rejected",
                report.name,
                report.fetched,
                report.failed(),
                report.rejections.len()
            );
            run.counts.fetched += source_items.len() as u64;
            items.extend(source_items);
            run.sources.push(report);
        }

        items
    }

    async fn fetch_source(&self, source: &SourceEntry) -> (SourceReport, Vec<ContentItem>) {
        let mut report = SourceReport::new(source.name.clone());
        let mut inputs = source.targets.clone();

        if let Some(path) = &source.target_file {
            match parse_link_file(Path::new(path)) {
                Ok(links) => inputs.extend(links),
                Err(e) => {
                    tracing::warn!("Source {}: cannot read {}: {}", source.name, path, e);
                    report.load_error = Some(e.to_string());
                }
            }
        }
        report.submitted = inputs.len();

        let queue = CrawlQueue::new(
            Arc::clone(&self.parts.adapters),
            Arc::clone(&self.parts.controller),
            Arc::clone(&self.parts.surfaces),
            &self.queue_config,
        );

        let validation = queue.submit(&inputs);
        report.accepted = validation.accepted_count();
        report.rejections = validation.rejected;
        if report.accepted == 0 {
            return (report, Vec::new());
        }

        self.lock().queues.push(queue.clone());
        let drain = queue.drain(queue.default_options());
        if self.stop.load(Ordering::SeqCst) {
            queue.stop();
        }
        let results: Vec<TargetResult> = drain.collect().await;

        let mut items = Vec::new();
        for result in results {
            match result.content_item {
                Some(item) if result.success => items.push(item),
                _ => report.failures.push(TargetFailure {
                    target: result.target.normalized_url.to_string(),
                    error_kind: result.error_kind,
                    message: result.message,
                }),
            }
        }

        report.fetched = items.len();
        report.skipped = queue.pending();
        (report, items)
    }

    async fn analyze_phase(&self, run: &mut PipelineRun, items: Vec<ContentItem>) -> Vec<AnalyzedItem> {
        let analyzers = &self.parts.analyzers;
        let weights = &self.weights;

        let analyzed: Vec<AnalyzedItem> = stream::iter(items)
            .map(|item| async move {
                let analysis = analyze_item(&item, analyzers, weights).await;
                AnalyzedItem { item, analysis }
            })
            .buffered(self.config.analyzer_concurrency.max(1))
            .collect()
            .await;

        for entry in &analyzed {
            if entry.analysis.has_score() {
                run.counts.analyzed += 1;
            }
            for (analyzer, reason) in &entry.analysis.failures {
                run.record_failure(Phase::Analyzing, entry.item.url.clone(), format!("{}: {}", analyzer, reason));
            }
        }

        analyzed
    }

    /// Drops items below the score threshold; the only phase that discards items
    fn filter_phase(&self, run: &mut PipelineRun, analyzed: Vec<AnalyzedItem>) -> Vec<AnalyzedItem> {
        let threshold = self.config.score_threshold;
        let (kept, dropped): (Vec<AnalyzedItem>, Vec<AnalyzedItem>) =
            analyzed.into_iter().partition(|entry| entry.analysis.passes(threshold));

        for entry in &dropped {
            tracing::debug!(
                "Dropped {} (score {:?} < {})",
                entry.item.url,
                entry.analysis.composite,
                threshold
            );
        }

        run.counts.filtered_in = kept.len() as u64;
        run.counts.filtered_out = dropped.len() as u64;
        kept
    }

    async fn persist_phase(&self, run: &mut PipelineRun, items: Vec<AnalyzedItem>) -> Vec<AnalyzedItem> {
        let mut persisted = Vec::with_capacity(items.len());

        for entry in items {
            match self.parts.store.persist(&entry.item, &entry.analysis).await {
                Ok(id) => {
                    tracing::debug!("Persisted {} as {}", entry.item.url, id);
                    run.counts.persisted += 1;
                    persisted.push(entry);
                }
                Err(e) => {
                    tracing::warn!("Failed to persist {}: {}", entry.item.url, e);
                    run.record_failure(Phase::Persisting, entry.item.url.clone(), e.to_string());
                }
            }
        }

        persisted
    }

    /// Refreshes the aggregate views; failures are only logged and counted
    async fn cache_phase(&self, run: &mut PipelineRun, persisted: &[AnalyzedItem]) {
        let cutoff = self.config.high_score_cutoff;
        let views = [
            AggregateView::top_recent(persisted, cutoff, self.config.top_n),
            AggregateView::source_rollup(persisted, cutoff),
        ];

        for view in &views {
            match self.parts.cache.refresh(view).await {
                Ok(()) => run.cache_views_written += 1,
                Err(e) => {
                    tracing::warn!("Cache view {} not refreshed: {}", view.key, e);
                    run.cache_views_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pipeline_with, FixedAnalyzer, MemoryCache, MemoryStore, RecordingAdapter};
    use std::time::Duration;

    fn source(name: &str, targets: &[&str]) -> SourceEntry {
        SourceEntry {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            target_file: None,
        }
    }

    fn registry(entries: Vec<(SourceKind, RecordingAdapter)>) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        for (kind, adapter) in entries {
            registry.register(kind, Arc::new(adapter));
        }
        registry
    }

    fn scoring(score: f64) -> Vec<Arc<dyn Analyzer>> {
        vec![Arc::new(FixedAnalyzer::scoring("engagement", score))]
    }

    fn config(sources: Vec<SourceEntry>) -> PipelineConfig {
        PipelineConfig {
            sources,
            ..PipelineConfig::default()
        }
    }

    fn instagram_links(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("https://instagram.com/p/item{}", i)).collect()
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let links = instagram_links(5);
        let links: Vec<&str> = links.iter().map(String::as_str).collect();
        let sources = vec![
            source("a", &links),
            source("b", &["https://tiktok.com/@b/video/1", "https://tiktok.com/@b/video/2"]),
        ];
        let registry = registry(vec![
            (SourceKind::Instagram, RecordingAdapter::new()),
            (SourceKind::TikTok, RecordingAdapter::new().failing_on("tiktok")),
        ]);
        let store = MemoryStore::default();
        let orchestrator = pipeline_with(registry, scoring(90.0), store.clone(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert!(!run.is_fatal());
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counts.fetched, 5);
        assert_eq!(run.counts.persisted, 5);

        let fetch_failures: Vec<_> = run.failures_in(Phase::Fetching).collect();
        assert_eq!(fetch_failures.len(), 1);
        assert_eq!(fetch_failures[0].target, "b");

        let fetched_per_source: u64 = run.sources.iter().map(|s| s.fetched as u64).sum();
        assert_eq!(fetched_per_source, run.counts.fetched);
        assert_eq!(run.sources[1].failed(), 2);
        assert_eq!(store.stored().len(), 5);
    }

    #[tokio::test]
    async fn test_filter_drops_low_scores() {
        let sources = vec![source("a", &["https://instagram.com/p/1", "https://instagram.com/p/2"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let store = MemoryStore::default();
        let orchestrator = pipeline_with(registry, scoring(40.0), store.clone(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.counts.fetched, 2);
        assert_eq!(run.counts.analyzed, 2);
        assert_eq!(run.counts.filtered_in, 0);
        assert_eq!(run.counts.filtered_out, 2);
        assert_eq!(run.counts.persisted, 0);
        assert!(store.stored().is_empty());
        assert!(run.failures.is_empty());
    }

    #[tokio::test]
    async fn test_partial_analysis_survives() {
        let sources = vec![source("a", &["https://instagram.com/p/1"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let analyzers: Vec<Arc<dyn Analyzer>> = vec![
            Arc::new(FixedAnalyzer::scoring("visual", 80.0)),
            Arc::new(FixedAnalyzer::failing("copy")),
            Arc::new(FixedAnalyzer::scoring("hooks", 60.0)),
        ];
        let store = MemoryStore::default();
        let orchestrator = pipeline_with(registry, analyzers, store.clone(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.counts.filtered_in, 1);
        assert_eq!(store.stored(), vec![("https://instagram.com/p/1".to_string(), 70.0)]);
        let analysis_failures: Vec<_> = run.failures_in(Phase::Analyzing).collect();
        assert_eq!(analysis_failures.len(), 1);
        assert!(analysis_failures[0].reason.starts_with("copy:"));
    }

    #[tokio::test]
    async fn test_unscored_items_are_dropped() {
        let sources = vec![source("a", &["https://instagram.com/p/1"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let orchestrator =
            pipeline_with(registry, Vec::new(), MemoryStore::default(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.counts.analyzed, 0);
        assert_eq!(run.counts.filtered_out, 1);
        assert_eq!(run.counts.persisted, 0);
    }

    #[tokio::test]
    async fn test_persist_failures_do_not_abort() {
        let sources = vec![source("a", &["https://instagram.com/p/good", "https://instagram.com/p/bad"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let store = MemoryStore::failing_on("bad");
        let orchestrator = pipeline_with(registry, scoring(90.0), store.clone(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counts.filtered_in, 2);
        assert_eq!(run.counts.persisted, 1);
        let persist_failures: Vec<_> = run.failures_in(Phase::Persisting).collect();
        assert_eq!(persist_failures.len(), 1);
        assert_eq!(persist_failures[0].target, "https://instagram.com/p/bad");
    }

    #[tokio::test]
    async fn test_cache_failure_never_fails_run() {
        let sources = vec![source("a", &["https://instagram.com/p/1"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let orchestrator = pipeline_with(
            registry,
            scoring(90.0),
            MemoryStore::default(),
            MemoryCache::failing(),
            config(sources),
        );

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.cache_views_failed, 2);
        assert_eq!(run.cache_views_written, 0);
        assert!(run.failures.is_empty());
    }

    #[tokio::test]
    async fn test_cache_views_written() {
        let sources = vec![source("a", &["https://instagram.com/p/1", "https://instagram.com/p/2"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let cache = MemoryCache::default();
        let orchestrator = pipeline_with(registry, scoring(85.0), MemoryStore::default(), cache.clone(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert_eq!(run.cache_views_written, 2);
        let views = cache.views();
        let top = views.iter().find(|v| v.key == "top-recent").unwrap();
        assert_eq!(top.payload.as_array().unwrap().len(), 2);
        let rollup = views.iter().find(|v| v.key == "source-rollup").unwrap();
        assert_eq!(rollup.payload["instagram"]["total"], 2);
    }

    #[tokio::test]
    async fn test_no_sources_is_fatal() {
        let orchestrator = pipeline_with(
            AdapterRegistry::new(),
            scoring(90.0),
            MemoryStore::default(),
            MemoryCache::default(),
            config(Vec::new()),
        );

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert!(run.is_fatal());
        assert!(run.is_finished());
    }

    #[tokio::test]
    async fn test_all_inputs_rejected_is_fatal() {
        let sources = vec![source("a", &["not-a-url", "https://unsupported.example/p"])];
        let registry = registry(vec![(SourceKind::Instagram, RecordingAdapter::new())]);
        let orchestrator =
            pipeline_with(registry, scoring(90.0), MemoryStore::default(), MemoryCache::default(), config(sources));

        let run = orchestrator.run_full_pipeline().await.unwrap();

        assert!(run.is_fatal());
        assert_eq!(run.sources[0].rejections.len(), 2);
        assert_eq!(run.failures_in(Phase::Fetching).count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let sources = vec![source("a", &["https://instagram.com/p/1"])];
        let registry = registry(vec![(
            SourceKind::Instagram,
            RecordingAdapter::new().with_delay(Duration::from_millis(100)),
        )]);
        let orchestrator = Arc::new(pipeline_with(
            registry,
            scoring(90.0),
            MemoryStore::default(),
            MemoryCache::default(),
            config(sources),
        ));

        let first = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run_full_pipeline().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = orchestrator.status();
        assert!(status.active);
        assert_eq!(status.phase, Phase::Fetching);

        let second = orchestrator.run_full_pipeline().await;
        assert!(matches!(second, Err(PipelineError::RunAlreadyActive(_))));

        let run = first.await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(!orchestrator.status().active);
        assert_eq!(orchestrator.stats().runs.rejected, 1);
        assert_eq!(orchestrator.last_run().unwrap().id, run.id);
    }

    #[tokio::test]
    async fn test_stop_at_batch_boundary() {
        let links = instagram_links(12);
        let links: Vec<&str> = links.iter().map(String::as_str).collect();
        let sources = vec![source("a", &links)];
        let registry = registry(vec![(
            SourceKind::Instagram,
            RecordingAdapter::new().with_delay(Duration::from_millis(50)),
        )]);
        let store = MemoryStore::default();
        let orchestrator = Arc::new(pipeline_with(
            registry,
            scoring(90.0),
            store.clone(),
            MemoryCache::default(),
            config(sources),
        ));

        let running = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run_full_pipeline().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        orchestrator.stop();

        let run = running.await.unwrap().unwrap();

        assert_eq!(run.status, RunStatus::Stopped);
        assert_eq!(run.phase, Phase::Fetching);
        assert_eq!(run.counts.fetched, 5);
        assert_eq!(run.sources[0].skipped, 7);
        assert!(store.stored().is_empty());
    }
}
