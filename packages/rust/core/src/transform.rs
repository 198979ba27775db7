//! Transformation: clean landing artifacts into the curated zone.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tribunal_shared::{
    CuratedRecord, DecisionRecord, FileExtension, Result, TribunalError, content_hash,
};
use tribunal_storage::{BlobStore, BlobZone, MetadataStore, SelectionFilter};

use crate::progress::{BatchSummary, ProgressReporter, percentage};

/// Which records a transformation run targets.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    /// Only records without a curated counterpart.
    pub skip_existing: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: None,
            skip_existing: true,
        }
    }
}

impl TransformOptions {
    fn filter(&self) -> SelectionFilter {
        SelectionFilter {
            from: self.from,
            to: self.to,
            limit: self.limit,
            skip_existing: self.skip_existing,
            include_unlinked: false,
        }
    }
}

/// Transformation progress across the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct TransformStats {
    pub landing_with_files: u64,
    pub curated_total: u64,
    pub pending: u64,
    pub pct: f64,
}

/// Curated key: the source key's folder plus `{identifier}.{ext}`.
pub fn curated_key(source_key: &str, identifier: &str, extension: FileExtension) -> String {
    match source_key.rsplit_once('/') {
        Some((folder, _)) => format!("{folder}/{identifier}.{extension}"),
        None => format!("{identifier}.{extension}"),
    }
}

/// Reads landing objects, normalizes them, and records curated artifacts.
pub struct TransformWorker<'a, B: BlobStore> {
    store: &'a MetadataStore,
    landing: BlobZone<'a, B>,
    curated: BlobZone<'a, B>,
}

impl<'a, B: BlobStore> TransformWorker<'a, B> {
    pub fn new(store: &'a MetadataStore, landing: BlobZone<'a, B>, curated: BlobZone<'a, B>) -> Self {
        Self {
            store,
            landing,
            curated,
        }
    }

    #[instrument(skip_all, fields(bucket = %self.curated.bucket(), skip_existing = opts.skip_existing))]
    pub async fn run(
        &self,
        opts: &TransformOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        self.curated.ensure().await?;

        let candidates = self.store.find_transform_candidates(&opts.filter()).await?;
        let total = candidates.len() as u64;
        let mut summary = BatchSummary::new("transformation", total);

        let run_id = self.store.insert_run("transformation").await?;
        progress.stage("transformation", total);
        info!(total, "documents to transform");

        for (idx, record) in candidates.iter().enumerate() {
            progress.item(&record.identifier, idx as u64 + 1, total);
            match self.transform_one(record).await {
                Ok(curated) => {
                    debug!(identifier = %curated.identifier, key = %curated.file_path, "curated");
                    summary.success += 1;
                }
                Err(e) => {
                    warn!(identifier = %record.identifier, error = %e, "transformation failed");
                    summary.errors += 1;
                }
            }
        }

        if let Err(e) = self.store.finish_run(&run_id, &summary.to_json()).await {
            warn!(error = %e, "failed to record transformation run");
        }
        progress.done(&summary);
        info!(success = summary.success, errors = summary.errors, "transformation completed");

        Ok(summary)
    }

    /// Read, normalize, write, then record. The curated record is written last.
    pub async fn transform_one(&self, record: &DecisionRecord) -> Result<CuratedRecord> {
        let source = record.artifact.as_ref().ok_or_else(|| {
            TribunalError::validation(format!("{} has not been acquired", record.identifier))
        })?;

        let raw = self.landing.get(&source.file_path).await?.ok_or_else(|| {
            TribunalError::Storage(format!(
                "landing object {}/{} not found",
                self.landing.bucket(),
                source.file_path
            ))
        })?;

        let extension = FileExtension::from_key(&source.file_path).unwrap_or(FileExtension::Html);
        let output = match extension {
            FileExtension::Html => tribunal_cleaner::clean_bytes(&raw),
            FileExtension::Pdf | FileExtension::Docx => raw,
        };

        let key = curated_key(&source.file_path, &record.identifier, extension);
        let curated = CuratedRecord::from_source(record, key, content_hash(&output), Utc::now())?;

        self.curated
            .put(&curated.file_path, &output, extension.mime_type())
            .await?;
        self.store.upsert_curated(&curated).await?;

        Ok(curated)
    }

    pub async fn stats(&self) -> Result<TransformStats> {
        transform_stats(self.store).await
    }
}

/// Transformation counts, usable without building a worker.
pub async fn transform_stats(store: &MetadataStore) -> Result<TransformStats> {
    let landing_with_files = store.count_acquired().await?;
    let curated_total = store.count_curated().await?;
    Ok(TransformStats {
        landing_with_files,
        curated_total,
        pending: landing_with_files.saturating_sub(curated_total),
        pct: percentage(curated_total, landing_with_files),
    })
}
