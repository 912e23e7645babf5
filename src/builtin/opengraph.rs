//! Generic adapter reading Open Graph metadata
//!
//! Works for any source that serves `og:*` tags to anonymous clients.
//! Engagement counters are taken from the description when the source
//! embeds them there ("1,234 likes, 56 comments - ...").

use crate::fetch::{Extraction, FetchSession, NavigationError};
use crate::queue::{AdapterError, ContentItem, CrawlTarget, EngagementMetrics, SourceAdapter};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

fn hashtag_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([\p{L}\p{N}_]+)").ok()).as_ref()
}

fn counter_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d[\d,.]*)\s*([kmb])?\s+(views?|likes?|comments?|shares?)\b").ok())
        .as_ref()
}

/// Source adapter built on `og:*` meta tags
#[derive(Debug, Clone, Default)]
pub struct OpenGraphAdapter;

impl OpenGraphAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceAdapter for OpenGraphAdapter {
    fn name(&self) -> &str {
        "opengraph"
    }

    async fn fetch(&self, target: &CrawlTarget, session: &mut FetchSession) -> Result<ContentItem, AdapterError> {
        let outcome = session.visit(&target.normalized_url).await;
        if !outcome.succeeded {
            return Err(AdapterError::from_outcome(outcome));
        }

        let final_url = session
            .last_navigation()
            .map(|nav| nav.final_url.to_string())
            .unwrap_or_else(|| target.normalized_url.to_string());

        let og_title = meta(session, "og:title").await?;
        let title = match og_title {
            Some(title) => Some(title),
            None => as_string(session.evaluate(&Extraction::Title).await?),
        };
        let description = match meta(session, "og:description").await? {
            Some(description) => Some(description),
            None => meta(session, "description").await?,
        };

        let mut media_urls = Vec::new();
        for property in ["og:video", "og:video:url", "og:image"] {
            if let Some(media) = meta(session, property).await? {
                if !media_urls.contains(&media) {
                    media_urls.push(media);
                }
            }
        }

        if title.is_none() && description.is_none() && media_urls.is_empty() {
            return Err(AdapterError::Extraction(format!("no metadata at {}", final_url)));
        }

        let site_name = meta(session, "og:site_name").await?;
        let og_type = meta(session, "og:type").await?;

        let (hashtags, metrics) = match description.as_deref() {
            Some(text) => (extract_hashtags(text), extract_metrics(text)),
            None => (Vec::new(), EngagementMetrics::default()),
        };

        let mut item = ContentItem::new(target.source_kind, final_url);
        item.title = title;
        item.description = description;
        item.media_urls = media_urls;
        item.hashtags = hashtags;
        item.metrics = metrics;
        item.extra = json!({
            "site-name": site_name,
            "og-type": og_type,
            "content-kind": target.content_kind.as_str(),
        });

        Ok(item)
    }
}

async fn meta(session: &mut FetchSession, property: &str) -> Result<Option<String>, NavigationError> {
    let value = session
        .evaluate(&Extraction::MetaProperty(property.to_string()))
        .await?;
    Ok(as_string(value))
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Hashtags in order of first appearance, lowercased and without `#`
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let Some(regex) = hashtag_regex() else {
        return tags;
    };

    for capture in regex.captures_iter(text) {
        let tag = capture[1].to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Reads counters such as "1.2M views" or "3,400 likes" out of text
pub fn extract_metrics(text: &str) -> EngagementMetrics {
    let mut metrics = EngagementMetrics::default();
    let Some(regex) = counter_regex() else {
        return metrics;
    };

    for capture in regex.captures_iter(text) {
        let Some(value) = parse_count(&capture[1], capture.get(2).map(|m| m.as_str())) else {
            continue;
        };

        let slot = match capture[3].to_lowercase().trim_end_matches('s') {
            "view" => &mut metrics.views,
            "like" => &mut metrics.likes,
            "comment" => &mut metrics.comments,
            "share" => &mut metrics.shares,
            _ => continue,
        };
        slot.get_or_insert(value);
    }

    metrics
}

fn parse_count(digits: &str, suffix: Option<&str>) -> Option<u64> {
    let multiplier = match suffix.map(str::to_ascii_lowercase).as_deref() {
        None => 1.0,
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        Some("b") => 1_000_000_000.0,
        Some(_) => return None,
    };

    if suffix.is_none() {
        // Separators in plain counts are thousands separators
        let plain: String = digits.chars().filter(char::is_ascii_digit).collect();
        return plain.parse().ok();
    }

    let value: f64 = digits.replace(',', ".").trim_end_matches('.').parse().ok()?;
    Some((value * multiplier).round() as u64)
}
