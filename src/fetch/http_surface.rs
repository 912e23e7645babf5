//! A browser surface backed by a plain HTTP client
//!
//! This surface handles:
//! - Building a reqwest client per identity (user agent, proxy, browser-like headers)
//! - Bounded GET navigation with redirect following
//! - Classifying status codes and challenge pages
//! - Extraction over the last loaded document
//!
//! It cannot render JavaScript or take screenshots.

use crate::fetch::document;
use crate::fetch::{BrowserSurface, Extraction, NavigationError, NavigationResult, ResourcePolicy, SurfaceFactory};
use crate::identity::Identity;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// The last document a surface loaded
#[derive(Debug, Clone)]
struct LoadedDocument {
    url: Url,
    body: String,
}

/// Builds an HTTP client presenting an identity
///
/// # Arguments
///
/// * `identity` - Supplies the user agent and, if present, the proxy
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - The proxy URL was rejected or the TLS backend failed
pub fn build_http_client(identity: &Identity) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = Client::builder()
        .user_agent(identity.client_signature.as_str())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &identity.proxy {
        let mut upstream = reqwest::Proxy::all(proxy.url())?;
        if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
            upstream = upstream.basic_auth(user, pass);
        }
        builder = builder.proxy(upstream);
    }

    builder.build()
}

/// Maps an HTTP status to a navigation error
///
/// | Status | Error |
/// |--------|-------|
/// | 401, 403, 429 | Blocked |
/// | 404, 410 | NotFound |
/// | other non-2xx | Network |
fn classify_status(status: StatusCode, url: &Url) -> Result<(), NavigationError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        401 | 403 | 429 => Err(NavigationError::Blocked(format!("HTTP {} for {}", status.as_u16(), url))),
        404 | 410 => Err(NavigationError::NotFound(format!("HTTP {} for {}", status.as_u16(), url))),
        code => Err(NavigationError::Network(format!("HTTP {} for {}", code, url))),
    }
}

/// HTTP-only implementation of [`BrowserSurface`]
#[derive(Debug, Default)]
pub struct HttpSurface {
    client: Option<Client>,
    policy: ResourcePolicy,
    document: Option<LoadedDocument>,
}

impl HttpSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrowserSurface for HttpSurface {
    async fn configure(&mut self, identity: &Identity) -> Result<(), NavigationError> {
        let client = build_http_client(identity)
            .map_err(|e| NavigationError::Network(format!("client for {}: {}", identity.id, e)))?;
        self.client = Some(client);
        Ok(())
    }

    async fn apply_resource_policy(&mut self, policy: &ResourcePolicy) -> Result<(), NavigationError> {
        self.policy = policy.clone();
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<NavigationResult, NavigationError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| NavigationError::Network("surface not configured".to_string()))?;

        self.document = None;

        let response = client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NavigationError::Timeout(timeout)
                } else if e.is_connect() {
                    NavigationError::Network(format!("connection failed: {}", e))
                } else {
                    NavigationError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let final_url = response.url().clone();
        classify_status(status, &final_url)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                NavigationError::Timeout(timeout)
            } else {
                NavigationError::Network(e.to_string())
            }
        })?;

        if document::is_challenge_page(&body) {
            return Err(NavigationError::Blocked(format!("challenge page at {}", final_url)));
        }

        let title = document::evaluate(&body, &final_url, &Extraction::Title, &self.policy)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string));

        self.document = Some(LoadedDocument {
            url: final_url.clone(),
            body,
        });

        Ok(NavigationResult {
            final_url,
            status: status.as_u16(),
            content_type,
            title,
        })
    }

    async fn evaluate(&mut self, extraction: &Extraction) -> Result<serde_json::Value, NavigationError> {
        let loaded = self.document.as_ref().ok_or(NavigationError::NotLoaded)?;
        document::evaluate(&loaded.body, &loaded.url, extraction, &self.policy)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, NavigationError> {
        Err(NavigationError::Unsupported("screenshot"))
    }
}

/// Creates an [`HttpSurface`] per session
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSurfaceFactory;

impl SurfaceFactory for HttpSurfaceFactory {
    fn create(&self) -> Box<dyn BrowserSurface> {
        Box::new(HttpSurface::new())
    }
}
