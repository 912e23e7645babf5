//! Built-in adapter and analyzer
//!
//! Enough to run the pipeline end to end against pages that expose Open
//! Graph metadata. Source-specific adapters and content analyzers plug in
//! through the same traits.

mod engagement;
mod opengraph;

pub use engagement::EngagementAnalyzer;
pub use opengraph::{extract_hashtags, extract_metrics, OpenGraphAdapter};

use crate::queue::AdapterRegistry;
use std::sync::Arc;

/// Registry with the Open Graph adapter serving every known source
pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register_all(Arc::new(OpenGraphAdapter::new()));
    registry
}
