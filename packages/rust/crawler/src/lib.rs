//! Discovery: partition planning, paced fetching, and result-page extraction.
//!
//! This crate provides:
//! - [`partition`]: Splits a date range into labelled windows
//! - [`http`]: Shared HTTP fetcher with pacing and transient-failure retries
//! - [`extract`]: Ordered identifier strategies over search-result rows
//! - [`engine`]: Window-by-window crawler that upserts into the metadata store

pub mod engine;
pub mod extract;
pub mod http;
pub mod partition;

pub use engine::{DiscoveryCrawler, DiscoveryReport};
pub use extract::{
    ExtractionOutcome, IDENTIFIER_RE, IdentifierStrategy, ParsedPage, ParsedRow, PatternStrategy,
    RowExtractor, SelectorStrategy, StrategyKind, derived_link, search_url,
};
pub use http::{FetchedBody, HttpFetcher, RetryPolicy};
pub use partition::PartitionPlanner;
