//! The crawl queue
//!
//! This module handles:
//! - Validating, normalizing and deduplicating submitted targets
//! - Priority ordering of pending targets
//! - Batched, bounded-concurrency dispatch to source adapters
//! - The background worker for incremental submissions
//! - Link-file ingestion

mod adapter;
mod crawl_queue;
mod frontier;
mod input;
mod target;

pub use adapter::{AdapterError, AdapterRegistry, ContentItem, EngagementMetrics, Provenance, SourceAdapter};
pub use crawl_queue::{CrawlQueue, DrainOptions, OutcomeCounts, QueueStats, TargetResult};
pub use frontier::Frontier;
pub use input::{parse_link_file, parse_links, LinkFileError};
pub use target::{CrawlTarget, Rejection, RejectionKind, RejectionReason, ValidationReport};
