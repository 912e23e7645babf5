//! Identity records
//!
//! An identity is a (proxy, client signature) pair. Records are owned by the
//! [`IdentityManager`](super::IdentityManager); callers only ever see clones.

use crate::config::{validate_proxy, ProxyEntry};
use crate::ConfigError;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Stable identifier of an identity within the pool
///
/// Proxy identities are keyed `host:port`, signature-only identities `sig-N`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier used when a fetch proceeds without a pooled identity
    pub fn direct() -> Self {
        Self("direct".to_string())
    }

    pub fn is_direct(&self) -> bool {
        self.0 == "direct"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An upstream proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Pool key of the proxy (`host:port`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Proxy URL without credentials
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Builds an endpoint from a configuration entry
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyEndpoint)` - The entry passed validation
    /// * `Err(ConfigError::InvalidProxy)` - Empty host, out of range port or unknown scheme
    pub fn from_entry(entry: &ProxyEntry) -> Result<Self, ConfigError> {
        validate_proxy(entry)?;

        let port = u16::try_from(entry.port)
            .map_err(|_| ConfigError::InvalidProxy(format!("port {} out of range", entry.port)))?;

        Ok(Self {
            scheme: entry.scheme.clone(),
            host: entry.host.trim().to_string(),
            port,
            username: entry.username.clone(),
            password: entry.password.clone(),
        })
    }

    /// Parses a proxy file line of the form `host:port[:user:pass]`
    ///
    /// # Examples
    ///
    /// ```
    /// use harvester::identity::ProxyEndpoint;
    ///
    /// let proxy = ProxyEndpoint::parse_line("10.0.0.1:8080:alice:secret").unwrap();
    /// assert_eq!(proxy.key(), "10.0.0.1:8080");
    /// assert_eq!(proxy.username.as_deref(), Some("alice"));
    ///
    /// assert!(ProxyEndpoint::parse_line("10.0.0.1").is_err());
    /// ```
    pub fn parse_line(line: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = line.trim().split(':').collect();

        let (host, port, credentials) = match parts.as_slice() {
            [host, port] => (*host, *port, None),
            [host, port, user, pass] => (*host, *port, Some((*user, *pass))),
            _ => {
                return Err(ConfigError::InvalidProxy(format!(
                    "expected host:port[:user:pass], got '{}'",
                    line.trim()
                )))
            }
        };

        let port: u32 = port
            .parse()
            .map_err(|_| ConfigError::InvalidProxy(format!("invalid port in '{}'", line.trim())))?;

        let entry = ProxyEntry {
            host: host.to_string(),
            port,
            username: credentials.map(|(user, _)| user.to_string()),
            password: credentials.map(|(_, pass)| pass.to_string()),
            scheme: "http".to_string(),
        };

        Self::from_entry(&entry)
    }
}

/// Health state of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityState {
    /// Never probed or reset since the last probe
    Untested,
    Healthy,
    /// Failed recently but is still below the blacklist threshold
    Degraded,
    /// Never selected until explicitly reset
    Blacklisted,
}

impl IdentityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untested => "untested",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Blacklisted => "blacklisted",
        }
    }
}

impl fmt::Display for IdentityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network identity and its health history
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub proxy: Option<ProxyEndpoint>,
    pub client_signature: String,
    pub success_count: u64,
    pub failure_count: u64,

    /// Failures since the last success, health check success or reset
    pub consecutive_failures: u32,

    pub last_used_at: Option<Instant>,
    pub last_health_check_at: Option<Instant>,
    pub last_latency: Option<Duration>,
    pub state: IdentityState,
}

impl Identity {
    pub fn new(id: IdentityId, proxy: Option<ProxyEndpoint>, client_signature: impl Into<String>) -> Self {
        Self {
            id,
            proxy,
            client_signature: client_signature.into(),
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_used_at: None,
            last_health_check_at: None,
            last_latency: None,
            state: IdentityState::Untested,
        }
    }

    /// A proxy identity keyed by its `host:port`
    pub fn with_proxy(proxy: ProxyEndpoint, client_signature: impl Into<String>) -> Self {
        Self::new(IdentityId::new(proxy.key()), Some(proxy), client_signature)
    }

    /// The identity used when no pooled identity is available
    pub fn direct(client_signature: impl Into<String>) -> Self {
        Self::new(IdentityId::direct(), None, client_signature)
    }

    pub fn is_blacklisted(&self) -> bool {
        self.state == IdentityState::Blacklisted
    }

    /// True when the identity was never probed or its last probe is older than `interval`
    pub fn needs_health_check(&self, interval: Duration, now: Instant) -> bool {
        match self.last_health_check_at {
            None => true,
            Some(checked) => now.saturating_duration_since(checked) >= interval,
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.state = IdentityState::Healthy;
    }

    /// Records a failure and returns true if it pushed the identity onto the blacklist
    pub(crate) fn record_failure(&mut self, threshold: u32) -> bool {
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= threshold {
            let newly = self.state != IdentityState::Blacklisted;
            self.state = IdentityState::Blacklisted;
            newly
        } else {
            self.state = IdentityState::Degraded;
            false
        }
    }

    pub(crate) fn record_probe_success(&mut self, latency: Duration, now: Instant) {
        self.consecutive_failures = 0;
        self.last_latency = Some(latency);
        self.last_health_check_at = Some(now);
        self.state = IdentityState::Healthy;
    }

    pub(crate) fn reset(&mut self, clear_history: bool) {
        self.state = IdentityState::Untested;
        self.consecutive_failures = 0;
        self.last_health_check_at = None;

        if clear_history {
            self.success_count = 0;
            self.failure_count = 0;
            self.last_latency = None;
            self.last_used_at = None;
        }
    }
}
