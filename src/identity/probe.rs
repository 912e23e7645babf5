//! Health probing of identities

use crate::config::IdentityConfig;
use crate::identity::Identity;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors produced by a health probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Probe returned HTTP {0}")]
    Status(u16),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Checks that an identity can reach the outside world
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes through the identity and returns the observed latency
    async fn probe(&self, identity: &Identity) -> Result<Duration, ProbeError>;
}

/// Probe fetching a fixed URL through the identity's proxy
///
/// Identities without a proxy are always considered reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.probe_url.clone(), config.probe_timeout())
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, identity: &Identity) -> Result<Duration, ProbeError> {
        let Some(proxy) = &identity.proxy else {
            return Ok(Duration::ZERO);
        };

        let mut upstream = reqwest::Proxy::all(proxy.url())?;
        if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
            upstream = upstream.basic_auth(user, pass);
        }

        let client = reqwest::Client::builder()
            .proxy(upstream)
            .user_agent(identity.client_signature.as_str())
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()?;

        let started = Instant::now();
        let response = client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        Ok(started.elapsed())
    }
}
