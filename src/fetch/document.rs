//! Extraction over a loaded HTML document
//!
//! Used by the HTTP surface to answer [`Extraction`] requests:
//! - Page title
//! - CSS selector matches (text or attribute, URLs made absolute)
//! - `<meta>` properties such as Open Graph tags
//! - Sub-resources the page would load under a resource policy

use crate::fetch::{Extraction, NavigationError, ResourceKind, ResourcePolicy};
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;

/// Markers of bot challenges and interstitials served with a 200 status
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-challenge",
    "challenge-platform",
    "g-recaptcha",
    "h-captcha",
    "<title>Just a moment...</title>",
    "unusual traffic from your computer",
];

/// True if the body looks like a bot challenge rather than content
pub fn is_challenge_page(html: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Evaluates an extraction against an HTML document
///
/// # Arguments
///
/// * `html` - The document body
/// * `base_url` - URL the document was loaded from, for resolving relative links
/// * `extraction` - What to read
/// * `policy` - Resource policy of the session, used by [`Extraction::Resources`]
///
/// # Returns
///
/// * `Ok(Value)` - String, array of strings, or null when nothing matched
/// * `Err(NavigationError::InvalidSelector)` - The CSS selector did not parse
pub fn evaluate(
    html: &str,
    base_url: &Url,
    extraction: &Extraction,
    policy: &ResourcePolicy,
) -> Result<Value, NavigationError> {
    let document = Html::parse_document(html);

    let value = match extraction {
        Extraction::Title => extract_title(&document).map_or(Value::Null, Value::String),
        Extraction::Selector { css, attribute } => {
            let matches = select_all(&document, css, attribute.as_deref(), base_url)?;
            Value::Array(matches.into_iter().map(Value::String).collect())
        }
        Extraction::MetaProperty(name) => {
            meta_property(&document, name).map_or(Value::Null, Value::String)
        }
        Extraction::Resources => Value::Array(resources(&document, base_url, policy)),
    };

    Ok(value)
}

/// Extracts the page title from the HTML document
pub fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_all(
    document: &Html,
    css: &str,
    attribute: Option<&str>,
    base_url: &Url,
) -> Result<Vec<String>, NavigationError> {
    let selector = Selector::parse(css)
        .map_err(|e| NavigationError::InvalidSelector(format!("'{}': {:?}", css, e)))?;

    let values = document
        .select(&selector)
        .filter_map(|element| match attribute {
            Some(name @ ("href" | "src")) => element
                .value()
                .attr(name)
                .and_then(|value| resolve_link(value, base_url)),
            Some(name) => element.value().attr(name).map(|value| value.trim().to_string()),
            None => {
                let text = element.text().collect::<String>().trim().to_string();
                (!text.is_empty()).then_some(text)
            }
        })
        .collect();

    Ok(values)
}

/// Content of `<meta property="..">` or `<meta name="..">`
fn meta_property(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse("meta[content]").ok()?;

    document
        .select(&selector)
        .find(|element| {
            let meta = element.value();
            meta.attr("property") == Some(name) || meta.attr("name") == Some(name)
        })
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

/// Sub-resources referenced by the document that the policy lets through
fn resources(document: &Html, base_url: &Url, policy: &ResourcePolicy) -> Vec<Value> {
    let sources = [
        ("script[src]", "src", Some(ResourceKind::Script)),
        ("link[rel='stylesheet'][href]", "href", Some(ResourceKind::Stylesheet)),
        ("img[src]", "src", Some(ResourceKind::Image)),
        ("video[src], audio[src], source[src]", "src", Some(ResourceKind::Media)),
        ("link[rel='preload'][href]", "href", None),
    ];

    let mut found = Vec::new();
    for (css, attribute, kind) in sources {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };

        for element in document.select(&selector) {
            let Some(url) = element
                .value()
                .attr(attribute)
                .and_then(|value| resolve_link(value, base_url))
            else {
                continue;
            };

            let kind = kind.unwrap_or_else(|| ResourceKind::from_url(&url));
            if policy.allows(kind, &url) {
                found.push(json!({ "url": url, "kind": kind }));
            }
        }
    }

    found
}

/// Resolves an attribute value to an absolute http(s) URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` values,
/// fragment-only links, and anything that does not resolve.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    matches!(absolute_url.scheme(), "http" | "https").then(|| absolute_url.to_string())
}
