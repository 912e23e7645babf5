//! Shared helpers for the integration tests
//!
//! Targets must name a known source, so pages are served by a mock server
//! and [`MockHostSurface`] sends every navigation there, keeping the path.

use async_trait::async_trait;
use harvester::config::{PipelineConfig, QueueConfig, SourceEntry};
use harvester::fetch::{
    BrowserSurface, Extraction, FetchController, FetchOptions, HttpSurface, NavigationError, NavigationResult,
    ResourcePolicy, SurfaceFactory,
};
use harvester::identity::{HealthProbe, Identity, IdentityManager, IdentityPolicy, ProbeError};
use harvester::pipeline::{Collaborators, PipelineOrchestrator};
use harvester::queue::AdapterRegistry;
use harvester::storage::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Probe that never reaches the network
pub struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn probe(&self, _identity: &Identity) -> Result<Duration, ProbeError> {
        Ok(Duration::from_millis(1))
    }
}

/// HTTP surface talking to the mock server instead of the real host
pub struct MockHostSurface {
    inner: HttpSurface,
    base: Url,
}

impl MockHostSurface {
    pub fn new(base: Url) -> Self {
        Self {
            inner: HttpSurface::new(),
            base,
        }
    }

    fn rewrite(&self, url: &Url) -> Url {
        let mut rewritten = self.base.clone();
        rewritten.set_path(url.path());
        rewritten.set_query(url.query());
        rewritten
    }
}

#[async_trait]
impl BrowserSurface for MockHostSurface {
    async fn configure(&mut self, identity: &Identity) -> Result<(), NavigationError> {
        self.inner.configure(identity).await
    }

    async fn apply_resource_policy(&mut self, policy: &ResourcePolicy) -> Result<(), NavigationError> {
        self.inner.apply_resource_policy(policy).await
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<NavigationResult, NavigationError> {
        let mut result = self.inner.navigate(&self.rewrite(url), timeout).await?;
        result.final_url = url.clone();
        Ok(result)
    }

    async fn evaluate(&mut self, extraction: &Extraction) -> Result<serde_json::Value, NavigationError> {
        self.inner.evaluate(extraction).await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, NavigationError> {
        self.inner.screenshot().await
    }
}

pub struct MockHostFactory {
    pub base: Url,
}

impl SurfaceFactory for MockHostFactory {
    fn create(&self) -> Box<dyn BrowserSurface> {
        Box::new(MockHostSurface::new(self.base.clone()))
    }
}

pub fn mock_factory(server: &MockServer) -> Arc<MockHostFactory> {
    Arc::new(MockHostFactory {
        base: Url::parse(&server.uri()).unwrap(),
    })
}

/// Controller with no proxies, so every fetch goes direct
pub fn direct_controller(max_retries: u32) -> (Arc<IdentityManager>, Arc<FetchController>) {
    let identities = Arc::new(IdentityManager::new(
        Vec::new(),
        IdentityPolicy::default(),
        Arc::new(AlwaysHealthy),
    ));
    let options = FetchOptions {
        max_retries,
        base_delay: Duration::ZERO,
        jitter: Duration::ZERO,
        navigation_timeout: Duration::from_secs(5),
        require_proxy: false,
    };
    let controller = Arc::new(FetchController::new(
        Arc::clone(&identities),
        options,
        ResourcePolicy::allow_all(),
    ));
    (identities, controller)
}

pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        batch_size: 5,
        inter_batch_delay_ms: 0,
        ..QueueConfig::default()
    }
}

/// Page with Open Graph tags; `description` carries the engagement counters
pub fn og_page(title: &str, description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title} | Site</title>
    <meta property="og:title" content="{title}">
    <meta property="og:description" content="{description}">
    <meta property="og:image" content="https://cdn.example.com/{title}.jpg">
    <meta property="og:type" content="video">
</head>
<body><p>{title}</p></body>
</html>"#
    )
}

pub async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, page_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub fn source(name: &str, targets: &[&str]) -> SourceEntry {
    SourceEntry {
        name: name.to_string(),
        targets: targets.iter().map(|t| t.to_string()).collect(),
        target_file: None,
    }
}

/// Orchestrator over the mock server with the built-in adapter and analyzer
pub fn orchestrator(
    server: &MockServer,
    store: Arc<SqliteStore>,
    config: PipelineConfig,
    adapters: AdapterRegistry,
) -> PipelineOrchestrator {
    let (_, controller) = direct_controller(2);
    let parts = Collaborators {
        adapters: Arc::new(adapters),
        controller,
        surfaces: mock_factory(server),
        analyzers: vec![Arc::new(harvester::builtin::EngagementAnalyzer::new())],
        store: store.clone(),
        cache: store,
    };

    PipelineOrchestrator::new(config, fast_queue_config(), parts)
}
