//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Retries per target: {}", config.fetch.max_retries);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, FetchConfig, IdentityConfig, OutputConfig, PipelineConfig, ProxyEntry, QueueConfig,
    SourceEntry,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub(crate) use validation::validate_proxy;
