//! Known-source table
//!
//! Maps normalized URLs to the publishing platform they belong to, infers a
//! content-kind hint from the path and derives the ordering priority.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Publishing platforms the harvester knows how to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Instagram,
    TikTok,
    YouTube,
    LinkedIn,
    Facebook,
    Twitter,
}

impl SourceKind {
    /// Registrable hosts owned by each source; subdomains match as well
    const HOSTS: &'static [(&'static str, SourceKind)] = &[
        ("instagram.com", SourceKind::Instagram),
        ("tiktok.com", SourceKind::TikTok),
        ("youtube.com", SourceKind::YouTube),
        ("youtu.be", SourceKind::YouTube),
        ("linkedin.com", SourceKind::LinkedIn),
        ("facebook.com", SourceKind::Facebook),
        ("fb.watch", SourceKind::Facebook),
        ("twitter.com", SourceKind::Twitter),
        ("x.com", SourceKind::Twitter),
    ];

    pub fn all() -> [SourceKind; 6] {
        [
            Self::Instagram,
            Self::TikTok,
            Self::YouTube,
            Self::LinkedIn,
            Self::Facebook,
            Self::Twitter,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::TikTok => "tiktok",
            Self::YouTube => "youtube",
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Default ordering weight of the source
    pub fn default_weight(&self) -> i64 {
        match self {
            Self::Instagram => 90,
            Self::TikTok => 85,
            Self::YouTube => 80,
            Self::Facebook => 75,
            Self::LinkedIn => 70,
            Self::Twitter => 65,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hint about what kind of content a target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Reel,
    Short,
    Video,
    Carousel,
    Post,
    Article,
    Story,
    Tweet,
    Unknown,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reel => "reel",
            Self::Short => "short",
            Self::Video => "video",
            Self::Carousel => "carousel",
            Self::Post => "post",
            Self::Article => "article",
            Self::Story => "story",
            Self::Tweet => "tweet",
            Self::Unknown => "unknown",
        }
    }

    pub fn default_weight(&self) -> i64 {
        match self {
            Self::Reel => 20,
            Self::Short => 18,
            Self::Video => 15,
            Self::Carousel => 12,
            Self::Post => 10,
            Self::Article => 10,
            Self::Story => 8,
            Self::Tweet => 5,
            Self::Unknown => 5,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the source of a normalized URL from the known-source table
///
/// # Examples
///
/// ```
/// use harvester::url::{identify_source, normalize_url, SourceKind};
///
/// let url = normalize_url("https://x.com/someone/status/1").unwrap();
/// assert_eq!(identify_source(&url), Some(SourceKind::Twitter));
///
/// let url = normalize_url("https://unsupported.example/p").unwrap();
/// assert_eq!(identify_source(&url), None);
/// ```
pub fn identify_source(url: &Url) -> Option<SourceKind> {
    let host = url.host_str()?;

    SourceKind::HOSTS
        .iter()
        .find(|(domain, _)| host_matches(domain, host))
        .map(|(_, kind)| *kind)
}

/// Exact host or any subdomain of it
fn host_matches(domain: &str, host: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Infers a content-kind hint from the URL path
pub fn infer_content_kind(url: &Url, source: SourceKind) -> ContentKind {
    let path = url.path().to_lowercase();

    match source {
        SourceKind::Instagram => {
            if path.contains("/reel/") || path.contains("/reels/") {
                ContentKind::Reel
            } else if path.contains("/stories/") {
                ContentKind::Story
            } else {
                ContentKind::Post
            }
        }
        SourceKind::TikTok => ContentKind::Video,
        SourceKind::YouTube => {
            if path.starts_with("/shorts/") {
                ContentKind::Short
            } else {
                ContentKind::Video
            }
        }
        SourceKind::LinkedIn => {
            if path.starts_with("/pulse/") {
                ContentKind::Article
            } else {
                ContentKind::Post
            }
        }
        SourceKind::Facebook => {
            if path.contains("/videos/") || url.host_str() == Some("fb.watch") {
                ContentKind::Video
            } else if path.contains("/stories/") {
                ContentKind::Story
            } else {
                ContentKind::Post
            }
        }
        SourceKind::Twitter => ContentKind::Tweet,
    }
}

/// Ordering weights; priority = source weight + content-kind weight
#[derive(Debug, Clone, Default)]
pub struct PriorityWeights {
    pub source: HashMap<SourceKind, i64>,
    pub content: HashMap<ContentKind, i64>,
}

impl PriorityWeights {
    pub fn priority(&self, source: SourceKind, content: ContentKind) -> i64 {
        let source_weight = self
            .source
            .get(&source)
            .copied()
            .unwrap_or_else(|| source.default_weight());
        let content_weight = self
            .content
            .get(&content)
            .copied()
            .unwrap_or_else(|| content.default_weight());

        source_weight + content_weight
    }
}
