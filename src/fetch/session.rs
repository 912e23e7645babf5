//! Fetch sessions
//!
//! A session pairs one browser surface with the controller. The resource
//! policy is applied once when the session starts, and the session keeps
//! its identity across visits until an attempt fails or the rotation
//! interval elapses.

use crate::fetch::controller::HeldIdentity;
use crate::fetch::{BrowserSurface, Extraction, FetchController, FetchOutcome, NavigationError, NavigationResult, VisitTrace};
use crate::identity::Identity;
use std::sync::Arc;
use url::Url;

pub struct FetchSession {
    controller: Arc<FetchController>,
    surface: Box<dyn BrowserSurface>,
    held: Option<HeldIdentity>,
    policy_applied: bool,
    last_navigation: Option<NavigationResult>,
}

impl FetchSession {
    pub fn new(controller: Arc<FetchController>, surface: Box<dyn BrowserSurface>) -> Self {
        Self {
            controller,
            surface,
            held: None,
            policy_applied: false,
            last_navigation: None,
        }
    }

    pub fn controller(&self) -> &Arc<FetchController> {
        &self.controller
    }

    /// Identity the session currently holds
    pub fn identity(&self) -> Option<&Identity> {
        self.held.as_ref().map(|held| &held.identity)
    }

    /// The page loaded by the last successful visit
    pub fn last_navigation(&self) -> Option<&NavigationResult> {
        self.last_navigation.as_ref()
    }

    /// Visits a target with the controller's retry policy
    ///
    /// # Returns
    ///
    /// The final outcome of the visit
    pub async fn visit(&mut self, url: &Url) -> FetchOutcome {
        self.visit_traced(url).await.into_final()
    }

    /// Like [`visit`](Self::visit) but keeps every attempt
    pub async fn visit_traced(&mut self, url: &Url) -> VisitTrace {
        if !self.policy_applied {
            if let Err(e) = self.surface.apply_resource_policy(self.controller.policy()).await {
                tracing::warn!("Resource policy not applied: {}", e);
            }
            self.policy_applied = true;
        }

        let controller = Arc::clone(&self.controller);
        let trace = controller
            .run_attempts(url, self.surface.as_mut(), &mut self.held, controller.options())
            .await;

        self.last_navigation = trace.navigation.clone();
        trace
    }

    /// Evaluates an extraction against the page of the last visit
    pub async fn evaluate(&mut self, extraction: &Extraction) -> Result<serde_json::Value, NavigationError> {
        self.surface.evaluate(extraction).await
    }

    pub async fn screenshot(&mut self) -> Result<Vec<u8>, NavigationError> {
        self.surface.screenshot().await
    }
}

/// Gives the held identity back to the pool
impl Drop for FetchSession {
    fn drop(&mut self) {
        self.controller.release(&mut self.held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ResourcePolicy;
    use crate::identity::{IdentityId, IdentityManager, IdentityPolicy, ProxyEndpoint};
    use crate::test_support::{instant_options, HealthyProbe, ScriptedSurface};
    use std::time::Duration;

    fn setup(hosts: &[&str], policy: IdentityPolicy) -> (Arc<IdentityManager>, Arc<FetchController>) {
        let identities: Vec<Identity> = hosts
            .iter()
            .map(|host| Identity::with_proxy(ProxyEndpoint::new(*host, 8080), "TestAgent/1.0"))
            .collect();
        let pool = Arc::new(IdentityManager::new(identities, policy, Arc::new(HealthyProbe)));
        let controller = Arc::new(FetchController::new(
            pool.clone(),
            instant_options(3),
            ResourcePolicy::allow_all(),
        ));
        (pool, controller)
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://tiktok.com/@someone/video/{}", path)).unwrap()
    }

    #[tokio::test]
    async fn test_identity_reused_across_visits() {
        let (_, controller) = setup(&["a", "b"], IdentityPolicy::default());
        let surface = ScriptedSurface::succeeding();
        let probe = surface.clone();
        let mut session = FetchSession::new(controller, Box::new(surface));

        let first = session.visit(&url("1")).await;
        let second = session.visit(&url("2")).await;

        assert_eq!(first.identity_used, second.identity_used);
        assert_eq!(probe.policy_applications(), 1);
        assert_eq!(probe.configurations(), 1);
    }

    #[tokio::test]
    async fn test_failure_rotates_session_identity() {
        let (_, controller) = setup(&["a", "b"], IdentityPolicy::default());
        let surface = ScriptedSurface::failing_then_ok(1, NavigationError::Network("reset".into()));
        let mut session = FetchSession::new(controller, Box::new(surface));

        let outcome = session.visit(&url("1")).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempt, 2);
        assert_eq!(session.identity().unwrap().id.as_str(), "b:8080");
    }

    #[tokio::test]
    async fn test_rotation_interval_swaps_identity() {
        let policy = IdentityPolicy {
            rotation_interval: Duration::ZERO,
            ..IdentityPolicy::default()
        };
        let (_, controller) = setup(&["a", "b"], policy);
        let mut session = FetchSession::new(controller, Box::new(ScriptedSurface::succeeding()));

        let first = session.visit(&url("1")).await;
        let second = session.visit(&url("2")).await;

        assert_ne!(first.identity_used, second.identity_used);
    }

    #[tokio::test]
    async fn test_drop_releases_lease() {
        let (pool, controller) = setup(&["a", "b"], IdentityPolicy::default());

        let mut session = FetchSession::new(controller, Box::new(ScriptedSurface::succeeding()));
        session.visit(&url("1")).await;
        assert_eq!(pool.stats().leased, 1);

        drop(session);
        assert_eq!(pool.stats().leased, 0);
        assert_eq!(pool.get(&IdentityId::new("a:8080")).unwrap().success_count, 1);
    }
}
