//! Error types for the tribunal pipeline.
//!
//! Library crates use [`TribunalError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use chrono::NaiveDate;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum TribunalError {
    /// Partition bounds are inverted. Fatal to planning.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Network, timeout or non-2xx response on a source or document fetch.
    #[error("fetch error for {url}: {message}")]
    Fetch {
        url: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        message: String,
        /// Whether the failure is worth retrying.
        transient: bool,
    },

    /// Blob or metadata write failure.
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// Metadata/blob read or connection failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Unrecoverable structural mismatch in fetched content.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A record has no document link and cannot be acquired.
    #[error("no document link for {identifier}")]
    MissingLink { identifier: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad key, missing precondition, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TribunalError>;

impl TribunalError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A fetch failure that carries an HTTP status.
    pub fn http_status(url: impl Into<String>, status: u16, transient: bool) -> Self {
        Self::Fetch {
            url: url.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
            transient,
        }
    }

    /// A fetch failure below the HTTP layer (DNS, connect, timeout, body read).
    pub fn network(url: impl Into<String>, message: impl Into<String>, transient: bool) -> Self {
        Self::Fetch {
            url: url.into(),
            status: None,
            message: message.into(),
            transient,
        }
    }

    /// Whether retrying the operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { transient: true, .. })
    }
}
