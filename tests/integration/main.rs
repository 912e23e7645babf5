//! Integration tests for harvester
//!
//! These tests use wiremock to serve pages and exercise fetching, the crawl
//! queue and full pipeline runs end to end.

mod common;
mod fetch_tests;
mod pipeline_tests;
mod queue_tests;
