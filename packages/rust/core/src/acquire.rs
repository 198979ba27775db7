//! Acquisition: fetch each discovered document into the landing zone.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tribunal_crawler::HttpFetcher;
use tribunal_shared::{
    DecisionRecord, FileExtension, HttpConfig, Result, StoredArtifact, TribunalError, blob_key,
    content_hash,
};
use tribunal_storage::{BlobStore, BlobZone, MetadataStore, SelectionFilter};

use crate::progress::{BatchSummary, ProgressReporter, percentage};

/// Which records an acquisition run targets.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Earliest published date (inclusive).
    pub from: Option<NaiveDate>,
    /// Latest published date (inclusive).
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    /// Only records without a stored artifact.
    pub skip_existing: bool,
    /// Also select records with no document link; each counts as an error.
    pub include_unlinked: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: None,
            skip_existing: true,
            include_unlinked: false,
        }
    }
}

impl AcquireOptions {
    fn filter(&self) -> SelectionFilter {
        SelectionFilter {
            from: self.from,
            to: self.to,
            limit: self.limit,
            skip_existing: self.skip_existing,
            include_unlinked: self.include_unlinked,
        }
    }
}

/// Acquisition progress across the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionStats {
    pub total: u64,
    pub downloaded: u64,
    pub pending: u64,
    pub pct: f64,
}

/// Fetches documents and records their landing artifacts.
pub struct AcquisitionWorker<'a, B: BlobStore> {
    store: &'a MetadataStore,
    landing: BlobZone<'a, B>,
    fetcher: HttpFetcher,
}

impl<'a, B: BlobStore> AcquisitionWorker<'a, B> {
    pub fn new(store: &'a MetadataStore, landing: BlobZone<'a, B>, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            store,
            landing,
            fetcher: HttpFetcher::new(http)?,
        })
    }

    /// Process every selected record once. Per-record failures are counted,
    /// never propagated; only a missing landing bucket aborts the run.
    #[instrument(skip_all, fields(bucket = %self.landing.bucket(), skip_existing = opts.skip_existing))]
    pub async fn run(
        &self,
        opts: &AcquireOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        self.landing.ensure().await?;

        let filter = opts.filter();
        let candidates = self.store.find_acquisition_candidates(&filter).await?;
        let total = candidates.len() as u64;
        let mut summary = BatchSummary::new("acquisition", total);

        let run_id = self.store.insert_run("acquisition").await?;
        progress.stage("acquisition", total);
        info!(total, "documents to acquire");

        for (idx, record) in candidates.iter().enumerate() {
            progress.item(&record.identifier, idx as u64 + 1, total);
            match self.acquire_one(record).await {
                Ok(artifact) => {
                    debug!(
                        identifier = %record.identifier,
                        key = %artifact.file_path,
                        "acquired"
                    );
                    summary.success += 1;
                }
                Err(e) => {
                    warn!(identifier = %record.identifier, error = %e, "acquisition failed");
                    summary.errors += 1;
                }
            }
        }

        if let Err(e) = self.store.finish_run(&run_id, &summary.to_json()).await {
            warn!(error = %e, "failed to record acquisition run");
        }
        progress.done(&summary);
        info!(success = summary.success, errors = summary.errors, "acquisition completed");

        Ok(summary)
    }

    /// Fetch, store, then record. Nothing is recorded unless the blob write succeeded.
    pub async fn acquire_one(&self, record: &DecisionRecord) -> Result<StoredArtifact> {
        let link = record
            .link_to_doc
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| TribunalError::MissingLink {
                identifier: record.identifier.clone(),
            })?;

        let fetched = self.fetcher.fetch(link).await?;

        let extension = FileExtension::classify(link, &fetched.content_type);
        let key = blob_key(&record.partition_date, &record.identifier, extension);
        let artifact = StoredArtifact {
            file_hash: content_hash(&fetched.bytes),
            file_path: key,
            downloaded_at: Utc::now(),
        };

        self.landing
            .put(&artifact.file_path, &fetched.bytes, extension.mime_type())
            .await?;
        self.store
            .record_artifact(&record.identifier, &artifact)
            .await?;

        // A re-fetch that now classifies differently lands under a new key.
        if let Some(previous) = record.artifact.as_ref() {
            if previous.file_path != artifact.file_path {
                self.landing.delete(&previous.file_path).await?;
                debug!(
                    identifier = %record.identifier,
                    stale = %previous.file_path,
                    "removed superseded landing object"
                );
            }
        }

        Ok(artifact)
    }

    pub async fn stats(&self) -> Result<AcquisitionStats> {
        acquisition_stats(self.store).await
    }
}

/// Acquisition counts, usable without building a worker.
pub async fn acquisition_stats(store: &MetadataStore) -> Result<AcquisitionStats> {
    let total = store.count_decisions().await?;
    let downloaded = store.count_acquired().await?;
    Ok(AcquisitionStats {
        total,
        downloaded,
        pending: total.saturating_sub(downloaded),
        pct: percentage(downloaded, total),
    })
}
