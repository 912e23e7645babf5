use crate::UrlError;
use url::Url;

/// Query parameters that only carry attribution and never change the content
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "igshid",
    "mc_eid",
    "ref",
    "ref_src",
    "si",
    "source",
    "tracking",
    "_t",
    "_r",
];

/// Host prefixes that alias the canonical host (`www.`, mobile `m.`)
const ALIAS_PREFIXES: &[&str] = &["www.", "m.", "mobile."];

/// Normalizes a raw link into the canonical form used for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or relative
/// 2. Only `http` and `https` are accepted; the result is always `https`
/// 3. Lowercase the host and strip alias prefixes (`www.`, `m.`, `mobile.`)
///    as long as a registrable name remains
/// 4. Normalize the path: drop empty and `.` segments, resolve `..`,
///    remove the trailing slash (root stays `/`)
/// 5. Remove the fragment and any credentials
/// 6. Remove tracking query parameters, sort the rest by key
///
/// The function is idempotent: feeding its output back in yields the same URL.
///
/// # Examples
///
/// ```
/// use harvester::url::normalize_url;
///
/// let url = normalize_url("http://WWW.Instagram.com/reel/abc/?utm_source=x").unwrap();
/// assert_eq!(url.as_str(), "https://instagram.com/reel/abc");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    let host = strip_alias_prefixes(&host);

    url.set_host(Some(host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    url.set_scheme("https")
        .map_err(|_| UrlError::Malformed("Cannot switch scheme to https".to_string()))?;
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Strips alias prefixes repeatedly while the remainder still contains a dot
fn strip_alias_prefixes(host: &str) -> &str {
    let mut current = host;
    loop {
        let stripped = ALIAS_PREFIXES
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix))
            .filter(|rest| rest.contains('.'));

        match stripped {
            Some(rest) => current = rest,
            None => return current,
        }
    }
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
