//! The browser automation surface a fetch session drives

use crate::fetch::ResourcePolicy;
use crate::identity::Identity;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Classification of a failed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Timeout,
    NetworkError,
    BlockedOrChallenged,
    ElementNotFound,
    /// No healthy identity while proxy use is mandatory
    IdentityExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network-error",
            Self::BlockedOrChallenged => "blocked-or-challenged",
            Self::ElementNotFound => "element-not-found",
            Self::IdentityExhausted => "identity-exhausted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a surface
#[derive(Debug, Clone, Error)]
pub enum NavigationError {
    #[error("Navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Blocked or challenged: {0}")]
    Blocked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("No document loaded")]
    NotLoaded,

    #[error("Unsupported by this surface: {0}")]
    Unsupported(&'static str),
}

impl NavigationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Blocked(_) => ErrorKind::BlockedOrChallenged,
            Self::NotFound(_) | Self::InvalidSelector(_) | Self::NotLoaded | Self::Unsupported(_) => {
                ErrorKind::ElementNotFound
            }
        }
    }
}

/// A successfully loaded page
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub title: Option<String>,
}

/// What to read out of the loaded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The `<title>` text, or null
    Title,

    /// Every match of a CSS selector: its text, or the given attribute
    Selector {
        css: String,
        attribute: Option<String>,
    },

    /// `<meta property=..>` or `<meta name=..>` content, or null
    MetaProperty(String),

    /// Sub-resources the page would load under the session's resource policy
    Resources,
}

/// Browser automation capability injected into each fetch session
#[async_trait]
pub trait BrowserSurface: Send {
    /// Presents the identity's client signature and routes through its proxy
    async fn configure(&mut self, identity: &Identity) -> Result<(), NavigationError>;

    /// Installs the resource-loading policy for the rest of the session
    async fn apply_resource_policy(&mut self, policy: &ResourcePolicy) -> Result<(), NavigationError>;

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<NavigationResult, NavigationError>;

    /// Evaluates an extraction against the last loaded document
    async fn evaluate(&mut self, extraction: &Extraction) -> Result<serde_json::Value, NavigationError>;

    async fn screenshot(&mut self) -> Result<Vec<u8>, NavigationError>;
}

/// Creates a fresh surface for every fetch session
pub trait SurfaceFactory: Send + Sync {
    fn create(&self) -> Box<dyn BrowserSurface>;
}
