use crate::config::types::{
    Config, FetchConfig, IdentityConfig, OutputConfig, PipelineConfig, ProxyEntry, QueueConfig,
};
use crate::fetch::ResourceKind;
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_identity_config(&config.identity)?;
    validate_queue_config(&config.queue)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.navigation_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "navigation-timeout-ms must be >= 100ms, got {}ms",
            config.navigation_timeout_ms
        )));
    }

    for kind in &config.blocked_resources {
        if ResourceKind::from_name(kind).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown resource kind in blocked-resources: '{}'",
                kind
            )));
        }
    }

    for pattern in &config.essential_patterns {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("essential pattern '{}': {}", pattern, e))
        })?;
    }

    Ok(())
}

fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.blacklist_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "blacklist-threshold must be >= 1, got {}",
            config.blacklist_threshold
        )));
    }

    Url::parse(&config.probe_url)
        .map_err(|e| ConfigError::Validation(format!("Invalid probe-url: {}", e)))?;

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    for proxy in &config.proxies {
        validate_proxy(proxy)?;
    }

    Ok(())
}

/// Validates a proxy entry (non-empty host, port in 1..=65535, known scheme)
pub(crate) fn validate_proxy(proxy: &ProxyEntry) -> Result<(), ConfigError> {
    if proxy.host.trim().is_empty() {
        return Err(ConfigError::InvalidProxy("host cannot be empty".to_string()));
    }

    if proxy.port < 1 || proxy.port > 65535 {
        return Err(ConfigError::InvalidProxy(format!(
            "{}: port must be between 1 and 65535, got {}",
            proxy.host, proxy.port
        )));
    }

    if !matches!(proxy.scheme.as_str(), "http" | "https" | "socks5") {
        return Err(ConfigError::InvalidProxy(format!(
            "{}:{}: unsupported scheme '{}'",
            proxy.host, proxy.port, proxy.scheme
        )));
    }

    if proxy.username.is_some() != proxy.password.is_some() {
        return Err(ConfigError::InvalidProxy(format!(
            "{}:{}: username and password must be given together",
            proxy.host, proxy.port
        )));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > 50 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and 50, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&config.score_threshold) {
        return Err(ConfigError::Validation(format!(
            "score-threshold must be between 0 and 100, got {}",
            config.score_threshold
        )));
    }

    if !(0.0..=100.0).contains(&config.high_score_cutoff) {
        return Err(ConfigError::Validation(format!(
            "high-score-cutoff must be between 0 and 100, got {}",
            config.high_score_cutoff
        )));
    }

    if config.analyzer_concurrency < 1 {
        return Err(ConfigError::Validation(
            "analyzer-concurrency must be >= 1".to_string(),
        ));
    }

    if config.weights.values().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ConfigError::Validation(
            "analyzer weights must be finite and non-negative".to_string(),
        ));
    }

    if !config.weights.is_empty() && config.weights.values().all(|w| *w == 0.0) {
        return Err(ConfigError::Validation(
            "at least one analyzer weight must be positive".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for source in &config.sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
    }

    if config.schedule_interval_secs == Some(0) {
        return Err(ConfigError::Validation(
            "schedule-interval-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.report_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "report-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
