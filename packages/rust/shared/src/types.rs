//! Core domain types for decision records and their stored artifacts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, TribunalError};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for stage-run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Partitions
// ---------------------------------------------------------------------------

/// Width of a discovery partition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

impl FromStr for Granularity {
    type Err = TribunalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(TribunalError::validation(format!(
                "unknown partition granularity '{other}' (expected daily, weekly or monthly)"
            ))),
        }
    }
}

/// One bounded discovery window. `start` and `end` are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Storage bucket label (year-month of `start`).
    pub label: String,
}

impl DateWindow {
    /// Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Stored document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileExtension {
    Html,
    Pdf,
    Docx,
}

impl FileExtension {
    /// Classify a fetched document: URL path suffix first, then declared content type.
    /// Anything unrecognised is treated as HTML.
    pub fn classify(url: &str, content_type: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content_type = content_type.to_ascii_lowercase();

        if path.ends_with(".pdf") || content_type.contains("pdf") {
            Self::Pdf
        } else if path.ends_with(".doc") || path.ends_with(".docx") || content_type.contains("word")
        {
            Self::Docx
        } else {
            Self::Html
        }
    }

    /// Recover the extension from a stored object key.
    pub fn from_key(key: &str) -> Option<Self> {
        let (_, ext) = key.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// MIME type declared when storing the object.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic blob key: `{partition}/{identifier}.{extension}`.
pub fn blob_key(partition: &str, identifier: &str, extension: FileExtension) -> String {
    format!("{partition}/{identifier}.{extension}")
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Parse a day/month/year published date (`3/1/2024`, `03/01/2024`).
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

// ---------------------------------------------------------------------------
// DecisionRecord
// ---------------------------------------------------------------------------

/// Landing-zone artifact fields. Their presence marks acquisition as complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub file_path: String,
    pub file_hash: String,
    pub downloaded_at: DateTime<Utc>,
}

/// A discovered decision, keyed by its business identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Unique case reference, e.g. `ADJ-00054658`.
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ref_no: String,
    /// Issuing authority.
    #[serde(default)]
    pub body: String,
    /// `dd/mm/yyyy` as published by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Absolute document URL; `None` means the record cannot be acquired.
    #[serde(default)]
    pub link_to_doc: Option<String>,
    /// Label of the discovery partition the record was found under.
    pub partition_date: String,
    pub scraped_at: DateTime<Utc>,
    #[serde(flatten)]
    pub artifact: Option<StoredArtifact>,
}

impl DecisionRecord {
    /// Whether the landing artifact has been stored.
    pub fn is_acquired(&self) -> bool {
        self.artifact.is_some()
    }

    /// The published date as a calendar date, if present and well-formed.
    pub fn published_on(&self) -> Option<NaiveDate> {
        self.published_date.as_deref().and_then(parse_published_date)
    }
}

// ---------------------------------------------------------------------------
// CuratedRecord
// ---------------------------------------------------------------------------

/// A transformed decision: source metadata plus curated and landing artifact pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedRecord {
    pub identifier: String,
    pub description: String,
    pub ref_no: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub link_to_doc: Option<String>,
    pub partition_date: String,
    pub scraped_at: DateTime<Utc>,
    pub downloaded_at: DateTime<Utc>,
    /// Curated-zone key.
    pub file_path: String,
    /// Hash of the curated bytes.
    pub file_hash: String,
    /// Landing-zone key the curated object was derived from.
    pub source_file_path: String,
    pub source_file_hash: String,
    pub transformed_at: DateTime<Utc>,
}

impl CuratedRecord {
    /// Build a curated record from an acquired source record.
    ///
    /// Fails if the source has no landing artifact.
    pub fn from_source(
        source: &DecisionRecord,
        file_path: String,
        file_hash: String,
        transformed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let artifact = source.artifact.as_ref().ok_or_else(|| {
            TribunalError::validation(format!(
                "{} has no landing artifact and cannot be curated",
                source.identifier
            ))
        })?;

        Ok(Self {
            identifier: source.identifier.clone(),
            description: source.description.clone(),
            ref_no: source.ref_no.clone(),
            body: source.body.clone(),
            published_date: source.published_date.clone(),
            link_to_doc: source.link_to_doc.clone(),
            partition_date: source.partition_date.clone(),
            scraped_at: source.scraped_at,
            downloaded_at: artifact.downloaded_at,
            file_path,
            file_hash,
            source_file_path: artifact.file_path.clone(),
            source_file_hash: artifact.file_hash.clone(),
            transformed_at,
        })
    }
}
