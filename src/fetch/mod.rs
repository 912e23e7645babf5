//! Resilient fetching
//!
//! This module contains:
//! - The browser automation surface contract and an HTTP implementation
//! - The resource-loading policy
//! - The fetch controller (retries, backoff, identity rotation)
//! - Fetch sessions that keep an identity across visits
//! - Aggregated fetch statistics

mod controller;
mod document;
mod http_surface;
mod resource;
mod session;
mod stats;
mod surface;

pub use controller::{FetchController, FetchOptions, FetchOutcome, VisitTrace};
pub use document::is_challenge_page;
pub use http_surface::{build_http_client, HttpSurface, HttpSurfaceFactory};
pub use resource::{ResourceKind, ResourcePolicy};
pub use session::FetchSession;
pub use stats::FetchStats;
pub use surface::{BrowserSurface, ErrorKind, Extraction, NavigationError, NavigationResult, SurfaceFactory};
