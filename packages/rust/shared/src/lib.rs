//! Shared types, error model, and configuration for the tribunal pipeline.
//!
//! This crate is the foundation depended on by all other tribunal crates.
//! It provides:
//! - [`TribunalError`]: the unified error type
//! - Domain types ([`DecisionRecord`], [`CuratedRecord`], [`DateWindow`], [`FileExtension`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], [`HttpConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AcquisitionConfig, AppConfig, CrawlConfig, CrawlSection, HttpConfig, RetryConfig,
    SourceConfig, StorageConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate,
};
pub use error::{Result, TribunalError};
pub use types::{
    CuratedRecord, DateWindow, DecisionRecord, FileExtension, Granularity, RunId, StoredArtifact,
    blob_key, content_hash, parse_published_date,
};
