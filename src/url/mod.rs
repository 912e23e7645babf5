//! URL handling for the harvester
//!
//! This module provides URL normalization and the known-source table used to
//! classify targets, infer their content kind and compute their priority.

mod normalize;
mod source;

pub use normalize::normalize_url;
pub use source::{identify_source, infer_content_kind, ContentKind, PriorityWeights, SourceKind};
