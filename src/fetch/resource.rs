//! Resource-loading policy
//!
//! Non-essential asset kinds are skipped unless their URL matches one of the
//! essential patterns.

use crate::config::FetchConfig;
use crate::ConfigError;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Xhr,
    Other,
}

impl ResourceKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "document" => Some(Self::Document),
            "script" => Some(Self::Script),
            "stylesheet" => Some(Self::Stylesheet),
            "image" => Some(Self::Image),
            "font" => Some(Self::Font),
            "media" => Some(Self::Media),
            "xhr" | "fetch" => Some(Self::Xhr),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Font => "font",
            Self::Media => "media",
            Self::Xhr => "xhr",
            Self::Other => "other",
        }
    }

    /// Guesses the kind of a resource from its URL's extension
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        match extension {
            "js" | "mjs" => Self::Script,
            "css" => Self::Stylesheet,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "avif" | "ico" => Self::Image,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "mp4" | "webm" | "mov" | "m3u8" | "mp3" | "m4a" | "ogg" => Self::Media,
            "html" | "htm" => Self::Document,
            "json" => Self::Xhr,
            _ => Self::Other,
        }
    }
}

/// Which sub-resources a session loads
#[derive(Debug, Clone, Default)]
pub struct ResourcePolicy {
    blocked: HashSet<ResourceKind>,
    essential: Vec<Regex>,
}

impl ResourcePolicy {
    pub fn new(blocked: impl IntoIterator<Item = ResourceKind>, essential: Vec<Regex>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
            essential,
        }
    }

    /// A policy that loads everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Builds the policy from the fetch configuration
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError)` - Unknown resource kind or invalid pattern
    pub fn from_config(config: &FetchConfig) -> Result<Self, ConfigError> {
        let blocked = config
            .blocked_resources
            .iter()
            .map(|name| {
                ResourceKind::from_name(name)
                    .ok_or_else(|| ConfigError::Validation(format!("Unknown resource kind '{}'", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let essential = config
            .essential_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(blocked, essential))
    }

    pub fn allows(&self, kind: ResourceKind, url: &str) -> bool {
        !self.blocked.contains(&kind) || self.essential.iter().any(|pattern| pattern.is_match(url))
    }

    pub fn is_blocking(&self) -> bool {
        !self.blocked.is_empty()
    }
}
