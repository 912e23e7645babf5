//! Output module for run reports and statistics
//!
//! This module handles:
//! - Writing markdown reports of finished runs
//! - Printing runs, stored statistics and identity pool health

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{print_pool_stats, print_run_summary, print_stored_stats, print_validation};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
