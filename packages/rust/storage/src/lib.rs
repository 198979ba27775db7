//! Durable storage for the tribunal pipeline.
//!
//! - [`MetadataStore`] wraps a libSQL database holding decision records,
//!   curated records and stage-run history. Every write is a single
//!   statement keyed by `identifier`, so upserts are atomic per record.
//! - [`blob`] provides the landing and curated object zones.
//!
//! **Access rules:**
//! - Pipeline stages: read-write via [`MetadataStore::open`]
//! - Dashboard/reporting consumers: read-only via [`MetadataStore::open_readonly`]

pub mod blob;
mod migrations;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, Row, params};
use serde::Serialize;
use tribunal_shared::{
    CuratedRecord, DecisionRecord, Result, RunId, StoredArtifact, TribunalError,
    parse_published_date,
};

pub use blob::{BlobStore, BlobZone, BlobZones, FsBlobStore, MemoryBlobStore};

/// Column list shared by every `decisions` read, in [`row_to_decision`] order.
const DECISION_COLUMNS: &str = "identifier, description, ref_no, body, published_date, \
     link_to_doc, partition_date, scraped_at, file_path, file_hash, downloaded_at";

/// Column list shared by every `decisions_curated` read, in [`row_to_curated`] order.
const CURATED_COLUMNS: &str = "identifier, description, ref_no, body, published_date, \
     link_to_doc, partition_date, scraped_at, downloaded_at, file_path, file_hash, \
     source_file_path, source_file_hash, transformed_at";

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Selection criteria for the acquisition and transformation stages.
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    /// Earliest published date (inclusive). Records without one are excluded.
    pub from: Option<NaiveDate>,
    /// Latest published date (inclusive). Records without one are excluded.
    pub to: Option<NaiveDate>,
    /// Maximum number of records returned.
    pub limit: Option<u32>,
    /// Only select records whose stage output is still missing.
    pub skip_existing: bool,
    /// Acquisition only: also select records with no document link.
    pub include_unlinked: bool,
}

impl SelectionFilter {
    /// Pending-only selection with no date bounds or cap.
    pub fn pending() -> Self {
        Self {
            skip_existing: true,
            ..Self::default()
        }
    }
}

/// Free-text search over discovered decisions.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring of identifier or description.
    pub text: Option<String>,
    /// Exact issuing authority.
    pub body: Option<String>,
    /// Lowest partition label (inclusive).
    pub partition_from: Option<String>,
    /// Highest partition label (inclusive).
    pub partition_to: Option<String>,
    pub limit: u32,
}

/// Recent-activity projection consumed by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub identifier: String,
    pub description: String,
    pub published_date: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A recorded stage execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: String,
    pub stage: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

// ---------------------------------------------------------------------------
// MetadataStore
// ---------------------------------------------------------------------------

/// Primary metadata handle wrapping a libSQL database.
pub struct MetadataStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl MetadataStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TribunalError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(read_err)?;

        let conn = db.connect().map_err(read_err)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database at `path` in read-only mode (for reporting consumers).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(read_err)?;

        let conn = db.connect().map_err(read_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        TribunalError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TribunalError::StoreWrite(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decision writes
    // -----------------------------------------------------------------------

    /// Create or merge a discovered decision, keyed by `identifier`.
    ///
    /// Only discovery fields are written; acquisition fields already on the
    /// row are left untouched, and `record.artifact` is ignored.
    pub async fn upsert_decision(&self, record: &DecisionRecord) -> Result<()> {
        self.check_writable()?;
        let published_on = record
            .published_date
            .as_deref()
            .and_then(parse_published_date)
            .map(iso_date);

        self.conn
            .execute(
                "INSERT INTO decisions (identifier, description, ref_no, body, published_date,
                                        published_on, link_to_doc, partition_date, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(identifier) DO UPDATE SET
                   description = excluded.description,
                   ref_no = excluded.ref_no,
                   body = excluded.body,
                   published_date = excluded.published_date,
                   published_on = excluded.published_on,
                   link_to_doc = excluded.link_to_doc,
                   partition_date = excluded.partition_date,
                   scraped_at = excluded.scraped_at",
                params![
                    record.identifier.as_str(),
                    record.description.as_str(),
                    record.ref_no.as_str(),
                    record.body.as_str(),
                    record.published_date.as_deref(),
                    published_on,
                    record.link_to_doc.as_deref(),
                    record.partition_date.as_str(),
                    record.scraped_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Mark a decision as acquired by attaching its landing artifact.
    pub async fn record_artifact(&self, identifier: &str, artifact: &StoredArtifact) -> Result<()> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE decisions SET file_path = ?1, file_hash = ?2, downloaded_at = ?3
                 WHERE identifier = ?4",
                params![
                    artifact.file_path.as_str(),
                    artifact.file_hash.as_str(),
                    artifact.downloaded_at.to_rfc3339(),
                    identifier,
                ],
            )
            .await
            .map_err(write_err)?;

        if updated == 0 {
            return Err(TribunalError::StoreWrite(format!(
                "no decision with identifier {identifier}"
            )));
        }
        Ok(())
    }

    /// Create or replace the curated record for an identifier.
    pub async fn upsert_curated(&self, record: &CuratedRecord) -> Result<()> {
        self.check_writable()?;
        let published_on = record
            .published_date
            .as_deref()
            .and_then(parse_published_date)
            .map(iso_date);

        self.conn
            .execute(
                "INSERT INTO decisions_curated (identifier, description, ref_no, body,
                     published_date, published_on, link_to_doc, partition_date, scraped_at,
                     downloaded_at, file_path, file_hash, source_file_path, source_file_hash,
                     transformed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(identifier) DO UPDATE SET
                   description = excluded.description,
                   ref_no = excluded.ref_no,
                   body = excluded.body,
                   published_date = excluded.published_date,
                   published_on = excluded.published_on,
                   link_to_doc = excluded.link_to_doc,
                   partition_date = excluded.partition_date,
                   scraped_at = excluded.scraped_at,
                   downloaded_at = excluded.downloaded_at,
                   file_path = excluded.file_path,
                   file_hash = excluded.file_hash,
                   source_file_path = excluded.source_file_path,
                   source_file_hash = excluded.source_file_hash,
                   transformed_at = excluded.transformed_at",
                params![
                    record.identifier.as_str(),
                    record.description.as_str(),
                    record.ref_no.as_str(),
                    record.body.as_str(),
                    record.published_date.as_deref(),
                    published_on,
                    record.link_to_doc.as_deref(),
                    record.partition_date.as_str(),
                    record.scraped_at.to_rfc3339(),
                    record.downloaded_at.to_rfc3339(),
                    record.file_path.as_str(),
                    record.file_hash.as_str(),
                    record.source_file_path.as_str(),
                    record.source_file_hash.as_str(),
                    record.transformed_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(write_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decision reads
    // -----------------------------------------------------------------------

    /// Get a decision by identifier.
    pub async fn get_decision(&self, identifier: &str) -> Result<Option<DecisionRecord>> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE identifier = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![identifier])
            .await
            .map_err(read_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_decision(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(read_err(e)),
        }
    }

    /// Get a curated record by identifier.
    pub async fn get_curated(&self, identifier: &str) -> Result<Option<CuratedRecord>> {
        let sql = format!("SELECT {CURATED_COLUMNS} FROM decisions_curated WHERE identifier = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![identifier])
            .await
            .map_err(read_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_curated(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(read_err(e)),
        }
    }

    /// Decisions eligible for acquisition.
    ///
    /// With `skip_existing`, records that already carry a `file_path` are
    /// excluded. Records without a `link_to_doc` are excluded unless
    /// `include_unlinked` is set.
    pub async fn find_acquisition_candidates(
        &self,
        filter: &SelectionFilter,
    ) -> Result<Vec<DecisionRecord>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions
             WHERE {ACQUISITION_PREDICATE}
             ORDER BY identifier
             LIMIT ?5"
        );
        let rows = self
            .conn
            .query(
                &sql,
                params![
                    i64::from(filter.skip_existing),
                    i64::from(filter.include_unlinked),
                    filter.from.map(iso_date),
                    filter.to.map(iso_date),
                    sql_limit(filter.limit),
                ],
            )
            .await
            .map_err(read_err)?;
        collect_rows(rows, row_to_decision).await
    }

    /// Size of the acquisition candidate set, ignoring `limit`.
    pub async fn count_acquisition_candidates(&self, filter: &SelectionFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM decisions WHERE {ACQUISITION_PREDICATE}");
        self.count(
            &sql,
            params![
                i64::from(filter.skip_existing),
                i64::from(filter.include_unlinked),
                filter.from.map(iso_date),
                filter.to.map(iso_date),
            ],
        )
        .await
    }

    /// Acquired decisions eligible for transformation.
    ///
    /// With `skip_existing`, identifiers that already have a curated record
    /// are excluded. Records without `file_path` are never selected.
    pub async fn find_transform_candidates(
        &self,
        filter: &SelectionFilter,
    ) -> Result<Vec<DecisionRecord>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions
             WHERE {TRANSFORM_PREDICATE}
             ORDER BY identifier
             LIMIT ?4"
        );
        let rows = self
            .conn
            .query(
                &sql,
                params![
                    i64::from(filter.skip_existing),
                    filter.from.map(iso_date),
                    filter.to.map(iso_date),
                    sql_limit(filter.limit),
                ],
            )
            .await
            .map_err(read_err)?;
        collect_rows(rows, row_to_decision).await
    }

    /// Size of the transformation candidate set, ignoring `limit`.
    pub async fn count_transform_candidates(&self, filter: &SelectionFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM decisions WHERE {TRANSFORM_PREDICATE}");
        self.count(
            &sql,
            params![
                i64::from(filter.skip_existing),
                filter.from.map(iso_date),
                filter.to.map(iso_date),
            ],
        )
        .await
    }

    /// All acquired decisions, ordered by identifier.
    pub async fn list_acquired(&self) -> Result<Vec<DecisionRecord>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions
             WHERE file_path IS NOT NULL ORDER BY identifier"
        );
        let rows = self.conn.query(&sql, params![]).await.map_err(read_err)?;
        collect_rows(rows, row_to_decision).await
    }

    /// All curated records, ordered by identifier.
    pub async fn list_curated(&self) -> Result<Vec<CuratedRecord>> {
        let sql = format!("SELECT {CURATED_COLUMNS} FROM decisions_curated ORDER BY identifier");
        let rows = self.conn.query(&sql, params![]).await.map_err(read_err)?;
        collect_rows(rows, row_to_curated).await
    }

    /// Every discovered decision, for export.
    pub async fn list_decisions(&self) -> Result<Vec<DecisionRecord>> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions ORDER BY identifier");
        let rows = self.conn.query(&sql, params![]).await.map_err(read_err)?;
        collect_rows(rows, row_to_decision).await
    }

    /// Search decisions by text, body and partition range, newest first.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<DecisionRecord>> {
        let pattern = query.text.as_deref().map(like_pattern);
        let sql = format!(
            r"SELECT {DECISION_COLUMNS} FROM decisions
              WHERE (?1 IS NULL OR identifier LIKE ?1 ESCAPE '\' OR description LIKE ?1 ESCAPE '\')
                AND (?2 IS NULL OR body = ?2)
                AND (?3 IS NULL OR partition_date >= ?3)
                AND (?4 IS NULL OR partition_date <= ?4)
              ORDER BY scraped_at DESC, identifier
              LIMIT ?5"
        );
        let rows = self
            .conn
            .query(
                &sql,
                params![
                    pattern,
                    query.body.as_deref(),
                    query.partition_from.as_deref(),
                    query.partition_to.as_deref(),
                    i64::from(query.limit),
                ],
            )
            .await
            .map_err(read_err)?;
        collect_rows(rows, row_to_decision).await
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    /// Total discovered decisions.
    pub async fn count_decisions(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM decisions", params![]).await
    }

    /// Decisions carrying a landing artifact.
    pub async fn count_acquired(&self) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM decisions WHERE file_path IS NOT NULL",
            params![],
        )
        .await
    }

    /// Unacquired decisions that can never be acquired (no link).
    pub async fn count_unlinked(&self) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM decisions
             WHERE file_path IS NULL AND (link_to_doc IS NULL OR link_to_doc = '')",
            params![],
        )
        .await
    }

    /// Curated records.
    pub async fn count_curated(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM decisions_curated", params![])
            .await
    }

    /// Decision counts grouped by issuing body, largest first.
    pub async fn counts_by_body(&self) -> Result<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT body, COUNT(*) AS n FROM decisions GROUP BY body ORDER BY n DESC, body",
        )
        .await
    }

    /// Decision counts grouped by partition label, in label order.
    pub async fn counts_by_partition(&self) -> Result<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT partition_date, COUNT(*) FROM decisions
             GROUP BY partition_date ORDER BY partition_date",
        )
        .await
    }

    /// Decision counts grouped by identifier prefix (`ADJ`, `IR-SC`, ...),
    /// largest first.
    pub async fn counts_by_case_type(&self) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query("SELECT identifier FROM decisions", params![])
            .await
            .map_err(read_err)?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(read_err)? {
            let identifier = row.get::<String>(0).map_err(read_err)?;
            if let Some(prefix) = case_type(&identifier) {
                *counts.entry(prefix.to_string()).or_default() += 1;
            }
        }

        let mut results: Vec<_> = counts.into_iter().collect();
        results.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(results)
    }

    /// Decision counts per published month (`YYYY-MM`), oldest first.
    pub async fn counts_by_published_month(&self) -> Result<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT substr(published_on, 1, 7) AS month, COUNT(*) FROM decisions
             WHERE published_on IS NOT NULL
             GROUP BY month ORDER BY month",
        )
        .await
    }

    /// Decisions discovered per UTC day, oldest first.
    pub async fn counts_by_scraped_day(&self) -> Result<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT substr(scraped_at, 1, 10) AS day, COUNT(*) FROM decisions
             GROUP BY day ORDER BY day",
        )
        .await
    }

    /// Most recently discovered decisions.
    pub async fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT identifier, description, published_date, scraped_at FROM decisions
                 ORDER BY scraped_at DESC, identifier LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(read_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(read_err)? {
            results.push(ActivityRow {
                identifier: row.get::<String>(0).map_err(read_err)?,
                description: row.get::<String>(1).unwrap_or_default(),
                published_date: row.get::<String>(2).ok(),
                scraped_at: parse_timestamp(&row.get::<String>(3).map_err(read_err)?)?,
            });
        }
        Ok(results)
    }

    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await.map_err(read_err)?;
        match rows.next().await.map_err(read_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(read_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    async fn grouped_counts(&self, sql: &str) -> Result<Vec<(String, u64)>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(read_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(read_err)? {
            let key = row.get::<String>(0).unwrap_or_default();
            let n = row.get::<i64>(1).map_err(read_err)?.max(0) as u64;
            results.push((key, n));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Stage runs
    // -----------------------------------------------------------------------

    /// Record the start of a stage run. Returns the generated run ID.
    pub async fn insert_run(&self, stage: &str) -> Result<RunId> {
        self.check_writable()?;
        let id = RunId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, stage, started_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), stage, now.as_str()],
            )
            .await
            .map_err(write_err)?;
        Ok(id)
    }

    /// Close a stage run with its final statistics.
    pub async fn finish_run(&self, id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE pipeline_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, id.to_string()],
            )
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Latest stage runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<PipelineRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, stage, started_at, finished_at, stats_json FROM pipeline_runs
                 ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(read_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(read_err)? {
            results.push(PipelineRun {
                id: row.get::<String>(0).map_err(read_err)?,
                stage: row.get::<String>(1).map_err(read_err)?,
                started_at: row.get::<String>(2).map_err(read_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

/// Acquisition selection; binds ?1 skip_existing, ?2 include_unlinked, ?3 from, ?4 to.
const ACQUISITION_PREDICATE: &str = "(?1 = 0 OR file_path IS NULL)
       AND (?2 = 1 OR (link_to_doc IS NOT NULL AND link_to_doc <> ''))
       AND (?3 IS NULL OR published_on >= ?3)
       AND (?4 IS NULL OR published_on <= ?4)";

/// Transformation selection; binds ?1 skip_existing, ?2 from, ?3 to.
const TRANSFORM_PREDICATE: &str = "file_path IS NOT NULL
       AND (?1 = 0 OR NOT EXISTS (
             SELECT 1 FROM decisions_curated c WHERE c.identifier = decisions.identifier))
       AND (?2 IS NULL OR published_on >= ?2)
       AND (?3 IS NULL OR published_on <= ?3)";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn read_err(e: libsql::Error) -> TribunalError {
    TribunalError::Storage(e.to_string())
}

fn write_err(e: libsql::Error) -> TribunalError {
    TribunalError::StoreWrite(e.to_string())
}

/// Leading uppercase/hyphen run of an identifier, trailing hyphens dropped.
fn case_type(identifier: &str) -> Option<&str> {
    let end = identifier
        .find(|c: char| !(c.is_ascii_uppercase() || c == '-'))
        .unwrap_or(identifier.len());
    let prefix = identifier[..end].trim_end_matches('-');
    (!prefix.is_empty()).then_some(prefix)
}

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map(i64::from).unwrap_or(-1)
}

/// Wrap user text in `%…%`, escaping LIKE metacharacters.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TribunalError::Storage(format!("invalid timestamp '{s}': {e}")))
}

async fn collect_rows<T>(mut rows: libsql::Rows, map: fn(&Row) -> Result<T>) -> Result<Vec<T>> {
    let mut results = Vec::new();
    while let Some(row) = rows.next().await.map_err(read_err)? {
        results.push(map(&row)?);
    }
    Ok(results)
}

/// Convert a database row to a [`DecisionRecord`].
fn row_to_decision(row: &Row) -> Result<DecisionRecord> {
    let artifact = match (
        row.get::<String>(8).ok(),
        row.get::<String>(9).ok(),
        row.get::<String>(10).ok(),
    ) {
        (Some(file_path), Some(file_hash), Some(downloaded_at)) => Some(StoredArtifact {
            file_path,
            file_hash,
            downloaded_at: parse_timestamp(&downloaded_at)?,
        }),
        _ => None,
    };

    Ok(DecisionRecord {
        identifier: row.get::<String>(0).map_err(read_err)?,
        description: row.get::<String>(1).unwrap_or_default(),
        ref_no: row.get::<String>(2).unwrap_or_default(),
        body: row.get::<String>(3).unwrap_or_default(),
        published_date: row.get::<String>(4).ok(),
        link_to_doc: row.get::<String>(5).ok().filter(|l| !l.is_empty()),
        partition_date: row.get::<String>(6).map_err(read_err)?,
        scraped_at: parse_timestamp(&row.get::<String>(7).map_err(read_err)?)?,
        artifact,
    })
}

/// Convert a database row to a [`CuratedRecord`].
fn row_to_curated(row: &Row) -> Result<CuratedRecord> {
    Ok(CuratedRecord {
        identifier: row.get::<String>(0).map_err(read_err)?,
        description: row.get::<String>(1).unwrap_or_default(),
        ref_no: row.get::<String>(2).unwrap_or_default(),
        body: row.get::<String>(3).unwrap_or_default(),
        published_date: row.get::<String>(4).ok(),
        link_to_doc: row.get::<String>(5).ok(),
        partition_date: row.get::<String>(6).map_err(read_err)?,
        scraped_at: parse_timestamp(&row.get::<String>(7).map_err(read_err)?)?,
        downloaded_at: parse_timestamp(&row.get::<String>(8).map_err(read_err)?)?,
        file_path: row.get::<String>(9).map_err(read_err)?,
        file_hash: row.get::<String>(10).map_err(read_err)?,
        source_file_path: row.get::<String>(11).map_err(read_err)?,
        source_file_hash: row.get::<String>(12).map_err(read_err)?,
        transformed_at: parse_timestamp(&row.get::<String>(13).map_err(read_err)?)?,
    })
}
