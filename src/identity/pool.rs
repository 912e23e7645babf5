//! The identity pool
//!
//! Selection is round-robin from a cursor, skipping blacklisted identities and
//! preferring identities that are not currently leased to another fetch. All
//! mutations happen under one lock; probes run outside of it.

use crate::config::{IdentityConfig, ProxyEntry};
use crate::identity::probe::HealthProbe;
use crate::identity::record::{Identity, IdentityId, IdentityState, ProxyEndpoint};
use crate::identity::signature::SignatureRotator;
use crate::ConfigError;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Rotation and blacklist policy of the pool
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    /// Consecutive failures that blacklist an identity
    pub blacklist_threshold: u32,

    /// Age after which an identity is probed again before it is handed out
    pub health_check_interval: Duration,

    /// Age after which a holder should swap its identity even without failures
    pub rotation_interval: Duration,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self::from(&IdentityConfig::default())
    }
}

impl From<&IdentityConfig> for IdentityPolicy {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            blacklist_threshold: config.blacklist_threshold,
            health_check_interval: config.health_check_interval(),
            rotation_interval: config.rotation_interval(),
        }
    }
}

/// Snapshot of the pool's health
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub blacklisted: usize,
    pub untested: usize,

    /// Identities that selection may still return
    pub available: usize,

    /// Identities currently held by a fetch
    pub leased: usize,

    pub average_latency: Option<Duration>,

    /// Identity most recently handed out
    pub current: Option<IdentityId>,
}

/// Result of probing every identity
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub working: Vec<IdentityId>,
    pub failed: Vec<IdentityId>,
}

struct PoolState {
    identities: Vec<Identity>,
    cursor: usize,
    leases: HashMap<IdentityId, usize>,
    current: Option<IdentityId>,
    signatures: SignatureRotator,
}

impl PoolState {
    fn find_mut(&mut self, id: &IdentityId) -> Option<&mut Identity> {
        self.identities.iter_mut().find(|identity| &identity.id == id)
    }

    fn is_leased(&self, id: &IdentityId) -> bool {
        self.leases.get(id).is_some_and(|count| *count > 0)
    }

    fn selectable(&self, index: usize, skip: &HashSet<IdentityId>) -> bool {
        let identity = &self.identities[index];
        !identity.is_blacklisted() && !skip.contains(&identity.id)
    }

    /// Picks the next identity in round-robin order and leases it
    ///
    /// Unleased identities win over leased ones; a leased identity is only
    /// returned when every other selectable identity is leased too.
    fn select(&mut self, skip: &HashSet<IdentityId>, now: Instant) -> Option<Identity> {
        let len = self.identities.len();
        if len == 0 {
            return None;
        }

        let order: Vec<usize> = (0..len).map(|offset| (self.cursor + offset) % len).collect();

        let index = order
            .iter()
            .copied()
            .find(|&index| self.selectable(index, skip) && !self.is_leased(&self.identities[index].id))
            .or_else(|| order.iter().copied().find(|&index| self.selectable(index, skip)))?;

        self.cursor = (index + 1) % len;

        let identity = &mut self.identities[index];
        identity.last_used_at = Some(now);
        let selected = identity.clone();

        *self.leases.entry(selected.id.clone()).or_insert(0) += 1;
        self.current = Some(selected.id.clone());

        Some(selected)
    }

    fn release(&mut self, id: &IdentityId) {
        if let Some(count) = self.leases.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.leases.remove(id);
            }
        }
    }
}

/// Owns the pool of network identities and their health state
pub struct IdentityManager {
    state: Mutex<PoolState>,
    policy: IdentityPolicy,
    probe: Arc<dyn HealthProbe>,
}

impl IdentityManager {
    /// Creates a manager over an explicit set of identities
    pub fn new(identities: Vec<Identity>, policy: IdentityPolicy, probe: Arc<dyn HealthProbe>) -> Self {
        Self::with_signatures(identities, SignatureRotator::builtin(), policy, probe)
    }

    fn with_signatures(
        identities: Vec<Identity>,
        signatures: SignatureRotator,
        policy: IdentityPolicy,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            state: Mutex::new(PoolState {
                identities,
                cursor: 0,
                leases: HashMap::new(),
                current: None,
                signatures,
            }),
            policy,
            probe,
        }
    }

    /// Builds the pool from configuration
    ///
    /// Proxies come from the `proxies` list and the optional proxy file; each
    /// gets a client signature in round-robin order. Without any proxy, the
    /// pool holds one signature-only identity per client signature.
    ///
    /// # Returns
    ///
    /// * `Ok(IdentityManager)` - The pool was built
    /// * `Err(ConfigError)` - The proxy file could not be read
    pub fn from_config(config: &IdentityConfig, probe: Arc<dyn HealthProbe>) -> Result<Self, ConfigError> {
        let signatures = SignatureRotator::new(config.user_agents.clone());
        let manager = Self::with_signatures(Vec::new(), signatures, IdentityPolicy::from(config), probe);

        manager.add_proxies(&config.proxies);
        if let Some(path) = &config.proxy_file {
            manager.load_proxy_file(Path::new(path))?;
        }

        let mut state = manager.lock();
        if state.identities.is_empty() {
            let signatures = state.signatures.signatures().to_vec();
            state.identities = signatures
                .into_iter()
                .enumerate()
                .map(|(index, signature)| {
                    Identity::new(IdentityId::new(format!("sig-{}", index + 1)), None, signature)
                })
                .collect();
        }
        let total = state.identities.len();
        drop(state);

        tracing::info!("Identity pool ready with {} identities", total);
        Ok(manager)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every identity record
    pub fn identities(&self) -> Vec<Identity> {
        self.lock().identities.clone()
    }

    pub fn get(&self, id: &IdentityId) -> Option<Identity> {
        self.lock().identities.iter().find(|identity| &identity.id == id).cloned()
    }

    /// Adds validated proxies to the pool
    ///
    /// Invalid entries and proxies already in the pool are skipped.
    ///
    /// # Returns
    ///
    /// The number of identities added
    pub fn add_proxies(&self, entries: &[ProxyEntry]) -> usize {
        let endpoints: Vec<ProxyEndpoint> = entries
            .iter()
            .filter_map(|entry| match ProxyEndpoint::from_entry(entry) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    tracing::warn!("Skipping proxy: {}", e);
                    None
                }
            })
            .collect();

        self.add_endpoints(endpoints)
    }

    fn add_endpoints(&self, endpoints: Vec<ProxyEndpoint>) -> usize {
        let mut state = self.lock();
        let mut added = 0;

        for endpoint in endpoints {
            let id = IdentityId::new(endpoint.key());
            if state.identities.iter().any(|identity| identity.id == id) {
                tracing::debug!("Proxy {} already in pool", id);
                continue;
            }

            let signature = state.signatures.next();
            state.identities.push(Identity::with_proxy(endpoint, signature));
            added += 1;
        }

        added
    }

    /// Loads proxies from a file of `host:port[:user:pass]` lines
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are skipped with a warning.
    pub fn load_proxy_file(&self, path: &Path) -> Result<usize, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let endpoints: Vec<ProxyEndpoint> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match ProxyEndpoint::parse_line(line) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    tracing::warn!("Skipping line in {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        let added = self.add_endpoints(endpoints);
        tracing::info!("Loaded {} proxies from {}", added, path.display());
        Ok(added)
    }

    /// Hands out the next usable identity
    ///
    /// Identities whose last health check is stale are probed first; a failed
    /// probe moves selection on to the next identity. At most one full cycle
    /// over the pool is attempted.
    ///
    /// # Returns
    ///
    /// * `Some(Identity)` - A leased identity; give it back with [`release`](Self::release)
    /// * `None` - Every identity is blacklisted or failed its probe
    pub async fn acquire(&self) -> Option<Identity> {
        let attempts = self.len();
        let mut skip = HashSet::new();

        for _ in 0..attempts {
            let now = Instant::now();
            let candidate = self.lock().select(&skip, now)?;

            if candidate.needs_health_check(self.policy.health_check_interval, now)
                && !self.health_check(&candidate.id).await
            {
                self.release(&candidate.id);
                skip.insert(candidate.id);
                continue;
            }

            tracing::debug!("Acquired identity {}", candidate.id);
            return self.get(&candidate.id).or(Some(candidate));
        }

        tracing::warn!("No usable identity left in a pool of {}", attempts);
        None
    }

    /// A signature-only identity for fetches that proceed without the pool
    pub fn direct_identity(&self) -> Identity {
        let signature = self.lock().signatures.least_used();
        Identity::direct(signature)
    }

    /// Gives a leased identity back to the pool
    pub fn release(&self, id: &IdentityId) {
        self.lock().release(id);
    }

    /// Records a successful use
    pub fn report_success(&self, id: &IdentityId) {
        let mut state = self.lock();
        if let Some(identity) = state.find_mut(id) {
            identity.record_success();
        }
    }

    /// Records a failed use and returns the identity's new state
    ///
    /// Reaching the blacklist threshold of consecutive failures blacklists the identity.
    pub fn report_failure(&self, id: &IdentityId) -> Option<IdentityState> {
        let mut state = self.lock();
        let identity = state.find_mut(id)?;

        if identity.record_failure(self.policy.blacklist_threshold) {
            tracing::warn!(
                "Identity {} blacklisted after {} consecutive failures",
                identity.id,
                identity.consecutive_failures
            );
        }

        Some(identity.state)
    }

    /// Probes an identity with a bounded timeout
    ///
    /// Success clears blacklist state and records the latency; failure counts
    /// as a failure and may blacklist the identity.
    ///
    /// # Returns
    ///
    /// True when the probe succeeded. Unknown identities return false.
    pub async fn health_check(&self, id: &IdentityId) -> bool {
        let Some(identity) = self.get(id) else {
            return false;
        };

        let result = self.probe.probe(&identity).await;
        let now = Instant::now();

        let mut state = self.lock();
        let Some(record) = state.find_mut(id) else {
            return false;
        };

        match result {
            Ok(latency) => {
                record.record_probe_success(latency, now);
                tracing::debug!("Identity {} healthy ({:?})", id, latency);
                true
            }
            Err(e) => {
                record.last_health_check_at = Some(now);
                if record.record_failure(self.policy.blacklist_threshold) {
                    tracing::warn!("Identity {} blacklisted by health check", id);
                }
                tracing::warn!("Health check failed for {}: {}", id, e);
                false
            }
        }
    }

    /// Probes every identity concurrently
    pub async fn check_all(&self) -> CheckReport {
        let ids: Vec<IdentityId> = self.identities().into_iter().map(|identity| identity.id).collect();

        let results = join_all(ids.iter().map(|id| self.health_check(id))).await;

        let mut report = CheckReport::default();
        for (id, working) in ids.into_iter().zip(results) {
            if working {
                report.working.push(id);
            } else {
                report.failed.push(id);
            }
        }

        tracing::info!(
            "Identity check: {} working, {} failed",
            report.working.len(),
            report.failed.len()
        );
        report
    }

    /// Clears blacklist state for all identities or a subset
    ///
    /// Reset identities become `Untested` and are probed again on next use.
    /// Success and failure counts survive unless `clear_history` is set.
    ///
    /// # Returns
    ///
    /// The number of identities reset
    pub fn reset_blacklist(&self, ids: Option<&[IdentityId]>, clear_history: bool) -> usize {
        let mut state = self.lock();
        let mut reset = 0;

        for identity in state.identities.iter_mut() {
            let selected = ids.map_or(true, |ids| ids.contains(&identity.id));
            if selected && (identity.is_blacklisted() || clear_history) {
                identity.reset(clear_history);
                reset += 1;
            }
        }

        tracing::info!("Reset {} identities", reset);
        reset
    }

    /// True when an identity held since `held_since` should be rotated out
    pub fn rotation_due(&self, held_since: Instant, now: Instant) -> bool {
        now.saturating_duration_since(held_since) >= self.policy.rotation_interval
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        let mut stats = PoolStats {
            total: state.identities.len(),
            leased: state.leases.len(),
            current: state.current.clone(),
            ..Default::default()
        };

        let mut latencies = Vec::new();
        for identity in &state.identities {
            match identity.state {
                IdentityState::Healthy => stats.healthy += 1,
                IdentityState::Degraded => stats.degraded += 1,
                IdentityState::Blacklisted => stats.blacklisted += 1,
                IdentityState::Untested => stats.untested += 1,
            }
            if let Some(latency) = identity.last_latency {
                latencies.push(latency);
            }
        }

        stats.available = stats.total - stats.blacklisted;
        if !latencies.is_empty() {
            let total: Duration = latencies.iter().sum();
            stats.average_latency = Some(total / latencies.len() as u32);
        }

        stats
    }
}
