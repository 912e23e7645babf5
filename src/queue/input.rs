//! Link-file ingestion
//!
//! Accepted layouts:
//! - JSON array of strings
//! - JSON object with a `links` array
//! - CSV, first column (a header row is skipped)
//! - One link per line
//!
//! Only entries starting with `http` are kept.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkFileError {
    #[error("Failed to read link file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON link file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonLinks {
    List(Vec<String>),
    Object { links: Vec<String> },
}

/// Reads raw links from a file
///
/// # Arguments
///
/// * `path` - The link file; a `.csv` extension selects CSV parsing
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Links in file order
/// * `Err(LinkFileError)` - The file could not be read or is broken JSON
pub fn parse_link_file(path: &Path) -> Result<Vec<String>, LinkFileError> {
    let content = std::fs::read_to_string(path)?;
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    parse_links(&content, is_csv)
}

/// Parses link-file content
pub fn parse_links(content: &str, is_csv: bool) -> Result<Vec<String>, LinkFileError> {
    let trimmed = content.trim_start();

    let candidates: Vec<String> = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str::<JsonLinks>(trimmed)? {
            JsonLinks::List(links) | JsonLinks::Object { links } => links,
        }
    } else if is_csv {
        content
            .lines()
            .filter_map(|line| line.split(',').next())
            .map(|cell| cell.trim().trim_matches('"').to_string())
            .collect()
    } else {
        content.lines().map(|line| line.trim().to_string()).collect()
    };

    Ok(candidates
        .into_iter()
        .map(|link| link.trim().to_string())
        .filter(|link| link.starts_with("http"))
        .collect())
}
