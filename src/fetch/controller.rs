//! Resilient fetch controller
//!
//! One logical visit runs up to `max_retries` navigation attempts. Every
//! failed attempt is reported to the identity pool, followed by a linear
//! backoff with jitter and a fresh identity. Only the final outcome leaves
//! the controller; intermediate attempts show up in [`FetchStats`] and in
//! the optional [`VisitTrace`].

use crate::config::FetchConfig;
use crate::fetch::{BrowserSurface, ErrorKind, FetchStats, NavigationError, NavigationResult, ResourcePolicy};
use crate::identity::{Identity, IdentityId, IdentityManager};
use crate::ConfigError;
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

/// Retry and timeout options of a visit
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Attempts per visit, including the first
    pub max_retries: u32,
    pub base_delay: Duration,

    /// Upper bound of the uniform jitter added to every backoff
    pub jitter: Duration,
    pub navigation_timeout: Duration,

    /// Fail with `IdentityExhausted` instead of going direct
    pub require_proxy: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.base_delay(),
            jitter: config.jitter(),
            navigation_timeout: config.navigation_timeout(),
            require_proxy: config.require_proxy,
        }
    }
}

impl FetchOptions {
    /// Delay before the retry that follows failed attempt `attempt`
    ///
    /// `base_delay * attempt` plus a uniform jitter in `[0, jitter]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };

        self.base_delay.saturating_mul(attempt) + Duration::from_millis(jitter)
    }
}

/// Record of one navigation attempt
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    /// Normalized URL of the target
    pub target: String,

    /// 1-based attempt number
    pub attempt: u32,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub elapsed_ms: u64,
    pub identity_used: IdentityId,
    pub message: Option<String>,
}

/// Every attempt of one visit, in order
#[derive(Debug, Clone)]
pub struct VisitTrace {
    pub outcomes: Vec<FetchOutcome>,

    /// The loaded page when the final attempt succeeded
    pub navigation: Option<NavigationResult>,
}

impl VisitTrace {
    /// The outcome that represents the whole visit
    ///
    /// The successful attempt if there was one, otherwise the last attempt.
    pub fn final_outcome(&self) -> Option<&FetchOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|outcome| outcome.succeeded)
            .or_else(|| self.outcomes.last())
    }

    pub fn into_final(mut self) -> FetchOutcome {
        let index = self
            .outcomes
            .iter()
            .rposition(|outcome| outcome.succeeded)
            .unwrap_or(self.outcomes.len().saturating_sub(1));

        // A visit always records at least one attempt
        self.outcomes.swap_remove(index)
    }

    pub fn succeeded(&self) -> bool {
        self.final_outcome().is_some_and(|outcome| outcome.succeeded)
    }
}

/// Identity currently held by a session or a single visit
#[derive(Debug)]
pub(crate) struct HeldIdentity {
    pub(crate) identity: Identity,

    /// False for the direct fallback, which the pool does not track
    pooled: bool,
    since: Instant,
}

/// Performs resilient visits on behalf of source adapters
pub struct FetchController {
    identities: Arc<IdentityManager>,
    options: FetchOptions,
    policy: ResourcePolicy,
    stats: Mutex<FetchStats>,
}

impl FetchController {
    pub fn new(identities: Arc<IdentityManager>, options: FetchOptions, policy: ResourcePolicy) -> Self {
        Self {
            identities,
            options,
            policy,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Builds a controller from the fetch configuration
    pub fn from_config(config: &FetchConfig, identities: Arc<IdentityManager>) -> Result<Self, ConfigError> {
        let policy = ResourcePolicy::from_config(config)?;
        Ok(Self::new(identities, FetchOptions::from(config), policy))
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub fn identities(&self) -> &Arc<IdentityManager> {
        &self.identities
    }

    pub fn stats(&self) -> FetchStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, FetchStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Visits a target as a one-off session
    ///
    /// Applies the resource policy, runs the retry loop with a fresh identity
    /// and gives the identity back afterwards.
    ///
    /// # Returns
    ///
    /// The final outcome: the successful attempt, or the last failed one
    pub async fn visit(&self, url: &Url, surface: &mut dyn BrowserSurface, options: &FetchOptions) -> FetchOutcome {
        self.visit_traced(url, surface, options).await.into_final()
    }

    /// Like [`visit`](Self::visit) but keeps every attempt
    pub async fn visit_traced(
        &self,
        url: &Url,
        surface: &mut dyn BrowserSurface,
        options: &FetchOptions,
    ) -> VisitTrace {
        if let Err(e) = surface.apply_resource_policy(&self.policy).await {
            tracing::warn!("Resource policy not applied: {}", e);
        }

        let mut held = None;
        let trace = self.run_attempts(url, surface, &mut held, options).await;
        self.release(&mut held);
        trace
    }

    /// The retry loop shared by one-off visits and sessions
    ///
    /// `held` carries the identity across visits of a session; it is dropped
    /// after every failed attempt and when the rotation interval has elapsed.
    pub(crate) async fn run_attempts(
        &self,
        url: &Url,
        surface: &mut dyn BrowserSurface,
        held: &mut Option<HeldIdentity>,
        options: &FetchOptions,
    ) -> VisitTrace {
        let max_retries = options.max_retries.max(1);
        let mut outcomes = Vec::new();

        for attempt in 1..=max_retries {
            if held
                .as_ref()
                .is_some_and(|current| self.identities.rotation_due(current.since, Instant::now()))
            {
                tracing::debug!("Rotation interval elapsed, swapping identity");
                self.release(held);
            }

            let started = Instant::now();

            if held.is_none() {
                match self.hold_identity(surface, options).await {
                    Ok(identity) => *held = Some(identity),
                    Err(outcome_error) => {
                        let (kind, message, identity_used) = outcome_error;
                        outcomes.push(self.outcome(url, attempt, Some(kind), started, identity_used, Some(message)));

                        // Nothing left to rotate to; retrying cannot help
                        if kind == ErrorKind::IdentityExhausted {
                            break;
                        }
                        self.back_off(url, attempt, max_retries, options).await;
                        continue;
                    }
                }
            }

            let Some(current) = held.as_ref() else {
                continue;
            };
            let identity_id = current.identity.id.clone();
            let pooled = current.pooled;

            let result = match tokio::time::timeout(
                options.navigation_timeout,
                surface.navigate(url, options.navigation_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NavigationError::Timeout(options.navigation_timeout)),
            };

            match result {
                Ok(navigation) => {
                    if pooled {
                        self.identities.report_success(&identity_id);
                    }
                    outcomes.push(self.outcome(url, attempt, None, started, identity_id, None));
                    self.lock_stats().record(true, attempt);
                    tracing::debug!("Visited {} on attempt {}", url, attempt);

                    return VisitTrace {
                        outcomes,
                        navigation: Some(navigation),
                    };
                }
                Err(e) => {
                    let kind = e.kind();
                    if pooled {
                        self.identities.report_failure(&identity_id);
                    }
                    tracing::warn!(
                        "Attempt {}/{} for {} via {} failed: {}",
                        attempt,
                        max_retries,
                        url,
                        identity_id,
                        e
                    );
                    outcomes.push(self.outcome(url, attempt, Some(kind), started, identity_id, Some(e.to_string())));

                    // Rotate on every failure
                    self.release(held);
                    self.back_off(url, attempt, max_retries, options).await;
                }
            }
        }

        let attempts = outcomes.len() as u32;
        self.lock_stats().record(false, attempts);

        VisitTrace {
            outcomes,
            navigation: None,
        }
    }

    /// Acquires an identity (or the direct fallback) and configures the surface with it
    async fn hold_identity(
        &self,
        surface: &mut dyn BrowserSurface,
        options: &FetchOptions,
    ) -> Result<HeldIdentity, (ErrorKind, String, IdentityId)> {
        let (identity, pooled) = match self.identities.acquire().await {
            Some(identity) => (identity, true),
            None if options.require_proxy => {
                return Err((
                    ErrorKind::IdentityExhausted,
                    "no healthy identity and proxy use is mandatory".to_string(),
                    IdentityId::direct(),
                ));
            }
            None => {
                tracing::warn!("Identity pool exhausted, continuing without proxy");
                (self.identities.direct_identity(), false)
            }
        };

        if let Err(e) = surface.configure(&identity).await {
            if pooled {
                self.identities.report_failure(&identity.id);
                self.identities.release(&identity.id);
            }
            return Err((e.kind(), e.to_string(), identity.id));
        }

        Ok(HeldIdentity {
            identity,
            pooled,
            since: Instant::now(),
        })
    }

    async fn back_off(&self, url: &Url, attempt: u32, max_retries: u32, options: &FetchOptions) {
        if attempt < max_retries {
            let delay = options.backoff(attempt);
            tracing::debug!("Retrying {} in {:?}", url, delay);
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn release(&self, held: &mut Option<HeldIdentity>) {
        if let Some(current) = held.take() {
            if current.pooled {
                self.identities.release(&current.identity.id);
            }
        }
    }

    fn outcome(
        &self,
        url: &Url,
        attempt: u32,
        error_kind: Option<ErrorKind>,
        started: Instant,
        identity_used: IdentityId,
        message: Option<String>,
    ) -> FetchOutcome {
        FetchOutcome {
            target: url.to_string(),
            attempt,
            succeeded: error_kind.is_none(),
            error_kind,
            elapsed_ms: started.elapsed().as_millis() as u64,
            identity_used,
            message,
        }
    }
}
