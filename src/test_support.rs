//! Test doubles shared by the unit tests

use crate::config::{PipelineConfig, QueueConfig};
use crate::fetch::{
    BrowserSurface, Extraction, FetchController, FetchOptions, FetchSession, NavigationError, NavigationResult,
    ResourcePolicy, SurfaceFactory,
};
use crate::identity::{HealthProbe, Identity, IdentityManager, IdentityPolicy, ProbeError, ProxyEndpoint};
use crate::pipeline::{
    AggregateView, AnalysisResult, Analyzer, AnalyzerError, Collaborators, PipelineOrchestrator, SubScore,
};
use crate::queue::{AdapterError, AdapterRegistry, ContentItem, CrawlQueue, CrawlTarget, EngagementMetrics, SourceAdapter};
use crate::storage::{Cache, CacheError, ContentStore, StorageError, StorageResult};
use crate::url::SourceKind;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Probe that always succeeds
pub struct HealthyProbe;

#[async_trait]
impl HealthProbe for HealthyProbe {
    async fn probe(&self, _identity: &Identity) -> Result<Duration, ProbeError> {
        Ok(Duration::from_millis(1))
    }
}

/// Probe that always fails
pub struct FailingProbe;

#[async_trait]
impl HealthProbe for FailingProbe {
    async fn probe(&self, _identity: &Identity) -> Result<Duration, ProbeError> {
        Err(ProbeError::Status(503))
    }
}

/// Options without any backoff
pub fn instant_options(max_retries: u32) -> FetchOptions {
    FetchOptions {
        max_retries,
        base_delay: Duration::ZERO,
        jitter: Duration::ZERO,
        navigation_timeout: Duration::from_secs(5),
        require_proxy: false,
    }
}

#[derive(Default)]
struct SurfaceState {
    failures_left: usize,
    always_fail: bool,
    error: Option<NavigationError>,
    delay: Option<Duration>,
    navigations: usize,
    configurations: usize,
    policy_applications: usize,
}

/// Surface following a script of failures; clones share their counters
#[derive(Clone, Default)]
pub struct ScriptedSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl ScriptedSurface {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fails the first `failures` navigations with `error`
    pub fn failing_then_ok(failures: usize, error: NavigationError) -> Self {
        let surface = Self::default();
        {
            let mut state = surface.state.lock().unwrap();
            state.failures_left = failures;
            state.error = Some(error);
        }
        surface
    }

    pub fn always_failing(error: NavigationError) -> Self {
        let surface = Self::default();
        {
            let mut state = surface.state.lock().unwrap();
            state.always_fail = true;
            state.error = Some(error);
        }
        surface
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn navigations(&self) -> usize {
        self.state.lock().unwrap().navigations
    }

    pub fn configurations(&self) -> usize {
        self.state.lock().unwrap().configurations
    }

    pub fn policy_applications(&self) -> usize {
        self.state.lock().unwrap().policy_applications
    }
}

#[async_trait]
impl BrowserSurface for ScriptedSurface {
    async fn configure(&mut self, _identity: &Identity) -> Result<(), NavigationError> {
        self.state.lock().unwrap().configurations += 1;
        Ok(())
    }

    async fn apply_resource_policy(&mut self, _policy: &ResourcePolicy) -> Result<(), NavigationError> {
        self.state.lock().unwrap().policy_applications += 1;
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<NavigationResult, NavigationError> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.navigations += 1;

        let fail = if state.always_fail {
            true
        } else if state.failures_left > 0 {
            state.failures_left -= 1;
            true
        } else {
            false
        };

        if fail {
            return Err(state.error.clone().unwrap_or(NavigationError::Network("scripted".into())));
        }

        Ok(NavigationResult {
            final_url: url.clone(),
            status: 200,
            content_type: Some("text/html".to_string()),
            title: Some("Scripted page".to_string()),
        })
    }

    async fn evaluate(&mut self, extraction: &Extraction) -> Result<serde_json::Value, NavigationError> {
        Ok(match extraction {
            Extraction::Title => serde_json::Value::String("Scripted page".to_string()),
            _ => serde_json::Value::Null,
        })
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, NavigationError> {
        Err(NavigationError::Unsupported("screenshot"))
    }
}

/// Hands out clones of one scripted surface
pub struct ScriptedSurfaceFactory(pub ScriptedSurface);

impl SurfaceFactory for ScriptedSurfaceFactory {
    fn create(&self) -> Box<dyn BrowserSurface> {
        Box::new(self.0.clone())
    }
}

#[derive(Default)]
struct AdapterState {
    visited: Vec<String>,
    current: usize,
    max_concurrent: usize,
}

/// Adapter visiting the target and returning a fixed item
#[derive(Clone, Default)]
pub struct RecordingAdapter {
    state: Arc<Mutex<AdapterState>>,
    failing_on: Option<String>,
    delay: Option<Duration>,
    views: Option<u64>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every target whose URL contains `pattern`
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.failing_on = Some(pattern.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_views(mut self, views: u64) -> Self {
        self.views = Some(views);
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().unwrap().max_concurrent
    }
}

#[async_trait]
impl SourceAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch(&self, target: &CrawlTarget, session: &mut FetchSession) -> Result<ContentItem, AdapterError> {
        let url = target.normalized_url.to_string();
        {
            let mut state = self.state.lock().unwrap();
            state.visited.push(url.clone());
            state.current += 1;
            state.max_concurrent = state.max_concurrent.max(state.current);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = session.visit(&target.normalized_url).await;
        self.state.lock().unwrap().current -= 1;

        if !outcome.succeeded {
            return Err(AdapterError::from_outcome(outcome));
        }
        if self.failing_on.as_ref().is_some_and(|pattern| url.contains(pattern.as_str())) {
            return Err(AdapterError::Extraction(format!("nothing to extract at {}", url)));
        }

        let mut item = ContentItem::new(target.source_kind, url.clone());
        item.title = Some(format!("Item at {}", url));
        item.metrics = EngagementMetrics {
            views: self.views,
            ..EngagementMetrics::default()
        };
        Ok(item)
    }
}

/// Two-proxy pool with a healthy probe
pub fn test_pool() -> Arc<IdentityManager> {
    let identities = ["p1", "p2"]
        .into_iter()
        .map(|host| Identity::with_proxy(ProxyEndpoint::new(host, 8080), "TestAgent/1.0"))
        .collect();
    Arc::new(IdentityManager::new(identities, IdentityPolicy::default(), Arc::new(HealthyProbe)))
}

/// Registry with the adapter on every source except LinkedIn
pub fn test_registry(adapter: RecordingAdapter) -> Arc<AdapterRegistry> {
    let adapter: Arc<dyn SourceAdapter> = Arc::new(adapter);
    let mut registry = AdapterRegistry::new();
    for kind in SourceKind::all() {
        if kind != SourceKind::LinkedIn {
            registry.register(kind, Arc::clone(&adapter));
        }
    }
    Arc::new(registry)
}

pub fn test_controller(identities: Arc<IdentityManager>) -> Arc<FetchController> {
    Arc::new(FetchController::new(identities, instant_options(3), ResourcePolicy::allow_all()))
}

/// Queue over scripted surfaces with the adapter on every source except LinkedIn
pub fn queue_with(adapter: RecordingAdapter, config: QueueConfig) -> (CrawlQueue, Arc<IdentityManager>) {
    let identities = test_pool();
    let queue = CrawlQueue::new(
        test_registry(adapter),
        test_controller(Arc::clone(&identities)),
        Arc::new(ScriptedSurfaceFactory(ScriptedSurface::succeeding())),
        &config,
    );
    (queue, identities)
}

/// Analyzer returning a fixed score, or always failing
pub struct FixedAnalyzer {
    name: String,
    score: Option<f64>,
    requires_media: bool,
}

impl FixedAnalyzer {
    pub fn scoring(name: &str, score: f64) -> Self {
        Self {
            name: name.to_string(),
            score: Some(score),
            requires_media: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            score: None,
            requires_media: false,
        }
    }

    /// Only applies to items with media URLs
    pub fn requiring_media(mut self) -> Self {
        self.requires_media = true;
        self
    }
}

#[async_trait]
impl Analyzer for FixedAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, item: &ContentItem) -> bool {
        !self.requires_media || !item.media_urls.is_empty()
    }

    async fn analyze(&self, _item: &ContentItem) -> Result<SubScore, AnalyzerError> {
        self.score
            .map(|score| SubScore::new(score, 0.8))
            .ok_or_else(|| AnalyzerError::Failed("scripted failure".to_string()))
    }
}

/// In-memory store keeping `(url, composite)` pairs
#[derive(Clone, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<Vec<(String, f64)>>>,
    failing_on: Option<String>,
}

impl MemoryStore {
    /// Rejects every item whose URL contains `pattern`
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            failing_on: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<(String, f64)> {
        self.items.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn persist(&self, item: &ContentItem, analysis: &AnalysisResult) -> StorageResult<String> {
        if self.failing_on.as_ref().is_some_and(|pattern| item.url.contains(pattern.as_str())) {
            return Err(StorageError::Database("disk full".to_string()));
        }

        let mut items = self.items.lock().unwrap();
        items.push((item.url.clone(), analysis.composite.unwrap_or(0.0)));
        Ok(format!("item-{}", items.len()))
    }
}

/// In-memory cache recording refreshed views
#[derive(Clone, Default)]
pub struct MemoryCache {
    views: Arc<Mutex<Vec<AggregateView>>>,
    failing: bool,
}

impl MemoryCache {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn views(&self) -> Vec<AggregateView> {
        self.views.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn refresh(&self, view: &AggregateView) -> Result<(), CacheError> {
        if self.failing {
            return Err(CacheError::Backend("connection refused".to_string()));
        }
        self.views.lock().unwrap().push(view.clone());
        Ok(())
    }
}

/// Orchestrator over scripted surfaces, without inter-batch delays
pub fn pipeline_with(
    adapters: AdapterRegistry,
    analyzers: Vec<Arc<dyn Analyzer>>,
    store: MemoryStore,
    cache: MemoryCache,
    config: PipelineConfig,
) -> PipelineOrchestrator {
    let queue_config = QueueConfig {
        batch_size: 5,
        inter_batch_delay_ms: 0,
        ..QueueConfig::default()
    };

    PipelineOrchestrator::new(
        config,
        queue_config,
        Collaborators {
            adapters: Arc::new(adapters),
            controller: test_controller(test_pool()),
            surfaces: Arc::new(ScriptedSurfaceFactory(ScriptedSurface::succeeding())),
            analyzers,
            store: Arc::new(store),
            cache: Arc::new(cache),
        },
    )
}
