use crate::url::{ContentKind, SourceKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub identity: IdentityConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Resilient fetch behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Attempts per target, including the first one
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `base * n` plus jitter
    pub base_delay_ms: u64,

    /// Upper bound of the uniform jitter added to each backoff
    pub jitter_ms: u64,

    /// Bound on a single navigation
    pub navigation_timeout_ms: u64,

    /// Fail targets instead of going direct when no identity is available
    pub require_proxy: bool,

    /// Resource kinds skipped unless their URL matches an essential pattern
    pub blocked_resources: Vec<String>,

    /// Regular expressions of resource URLs that are always loaded
    pub essential_patterns: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
            jitter_ms: 3000,
            navigation_timeout_ms: 30_000,
            require_proxy: false,
            blocked_resources: vec!["font".into(), "image".into(), "media".into()],
            essential_patterns: vec![
                r"\.(js|css)$".into(),
                r"api\.".into(),
                "ajax".into(),
                "graphql".into(),
            ],
        }
    }
}

impl FetchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Identity pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IdentityConfig {
    /// Consecutive failures since the last success that blacklist an identity
    pub blacklist_threshold: u32,

    /// Age after which an identity is probed again before use
    pub health_check_interval_secs: u64,

    /// Period after which a session drops its identity even without failures
    pub rotation_interval_secs: u64,

    /// URL fetched through a proxy to check that it works
    pub probe_url: String,

    /// Bound on a single health probe
    pub probe_timeout_ms: u64,

    /// Optional file of `host:port[:user:pass]` lines
    pub proxy_file: Option<String>,

    /// Client signatures; empty means the built-in list
    pub user_agents: Vec<String>,

    pub proxies: Vec<ProxyEntry>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            blacklist_threshold: 3,
            health_check_interval_secs: 300,
            rotation_interval_secs: 300,
            probe_url: "https://httpbin.org/ip".to_string(),
            probe_timeout_ms: 10_000,
            proxy_file: None,
            user_agents: Vec::new(),
            proxies: Vec::new(),
        }
    }
}

impl IdentityConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// A proxy listed in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEntry {
    pub host: String,
    pub port: u32,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_proxy_scheme")]
    pub scheme: String,
}

fn default_proxy_scheme() -> String {
    "http".to_string()
}

/// Crawl queue configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Targets dispatched concurrently per batch
    pub batch_size: usize,

    /// Pause between consecutive batches (milliseconds)
    pub inter_batch_delay_ms: u64,

    /// Overrides of the per-source ordering weight
    pub source_weights: HashMap<SourceKind, i64>,

    /// Overrides of the per-content-kind ordering weight
    pub content_weights: HashMap<ContentKind, i64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay_ms: 2000,
            source_weights: HashMap::new(),
            content_weights: HashMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

/// Full pipeline run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Items whose composite score is below this are dropped
    pub score_threshold: f64,

    /// Size of the top recent items cache view
    pub top_n: usize,

    /// Score from which an item counts as high-scoring in cache views
    pub high_score_cutoff: f64,

    /// Items analyzed concurrently
    pub analyzer_concurrency: usize,

    /// Bound of the failure list kept on a run
    pub max_failures: usize,

    /// Interval of recurring runs, if scheduled
    pub schedule_interval_secs: Option<u64>,

    /// Weight per analyzer name in the composite score (missing → 1.0)
    pub weights: HashMap<String, f64>,

    pub sources: Vec<SourceEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let weights = ["visual", "copy", "hooks"]
            .into_iter()
            .map(|name| (name.to_string(), 1.0))
            .collect();

        Self {
            score_threshold: 70.0,
            top_n: 100,
            high_score_cutoff: 80.0,
            analyzer_concurrency: 4,
            max_failures: 500,
            schedule_interval_secs: None,
            weights,
            sources: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn schedule_interval(&self) -> Option<Duration> {
        self.schedule_interval_secs.map(Duration::from_secs)
    }

    pub fn weight_for(&self, analyzer: &str) -> f64 {
        self.weights.get(analyzer).copied().unwrap_or(1.0)
    }
}

/// A named list of raw targets fetched together in the fetch phase
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceEntry {
    pub name: String,

    #[serde(default)]
    pub targets: Vec<String>,

    /// Optional link file (JSON, CSV or one URL per line)
    #[serde(default)]
    pub target_file: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Path to the markdown run report
    pub report_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./harvest.db".to_string(),
            report_path: None,
        }
    }
}
