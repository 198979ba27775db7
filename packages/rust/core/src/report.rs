//! Read-only consistency checks between the metadata store and the blob zones.

use serde::Serialize;
use tracing::{info, instrument, warn};

use tribunal_shared::{Result, content_hash};
use tribunal_storage::{ActivityRow, BlobStore, BlobZone, MetadataStore};

/// One count comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairCheck {
    pub left_label: String,
    pub left: u64,
    pub right_label: String,
    pub right: u64,
    pub in_sync: bool,
    /// Absolute difference, 0 when in sync.
    pub difference: u64,
}

impl PairCheck {
    pub fn new(left_label: &str, left: u64, right_label: &str, right: u64) -> Self {
        Self {
            left_label: left_label.to_string(),
            left,
            right_label: right_label.to_string(),
            right,
            in_sync: left == right,
            difference: left.abs_diff(right),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    /// Discovered vs. acquired. Out of sync means an acquisition backlog.
    pub discovered_vs_acquired: PairCheck,
    pub acquired_vs_landing: PairCheck,
    pub curated_vs_curated_zone: PairCheck,
}

impl ConsistencyReport {
    pub fn checks(&self) -> [&PairCheck; 3] {
        [
            &self.discovered_vs_acquired,
            &self.acquired_vs_landing,
            &self.curated_vs_curated_zone,
        ]
    }

    pub fn all_in_sync(&self) -> bool {
        self.checks().iter().all(|c| c.in_sync)
    }
}

/// Which blob zone a hash audit walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Landing,
    Curated,
}

/// Outcome of re-hashing stored objects against their recorded hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashAudit {
    pub checked: u64,
    /// Keys recorded in the store but absent from the zone.
    pub missing: Vec<String>,
    /// Keys whose bytes no longer match the recorded hash.
    pub mismatched: Vec<String>,
}

impl HashAudit {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Aggregate counts for the dashboard consumer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub scraped: u64,
    pub downloaded: u64,
    pub landing_files: u64,
    pub transformed: u64,
    pub curated_files: u64,
}

/// Compares record counts and hashes across the stores. Never writes.
pub struct ConsistencyReporter<'a, B: BlobStore> {
    store: &'a MetadataStore,
    landing: BlobZone<'a, B>,
    curated: BlobZone<'a, B>,
}

impl<'a, B: BlobStore> ConsistencyReporter<'a, B> {
    pub fn new(store: &'a MetadataStore, landing: BlobZone<'a, B>, curated: BlobZone<'a, B>) -> Self {
        Self {
            store,
            landing,
            curated,
        }
    }

    #[instrument(skip_all)]
    pub async fn report(&self) -> Result<ConsistencyReport> {
        let stats = self.pipeline_stats().await?;
        let report = ConsistencyReport {
            discovered_vs_acquired: PairCheck::new(
                "discovered",
                stats.scraped,
                "with artifact",
                stats.downloaded,
            ),
            acquired_vs_landing: PairCheck::new(
                "with artifact",
                stats.downloaded,
                "landing objects",
                stats.landing_files,
            ),
            curated_vs_curated_zone: PairCheck::new(
                "curated records",
                stats.transformed,
                "curated objects",
                stats.curated_files,
            ),
        };

        for check in report.checks() {
            if !check.in_sync {
                warn!(
                    left = %check.left_label,
                    right = %check.right_label,
                    difference = check.difference,
                    "counts out of sync"
                );
            }
        }
        Ok(report)
    }

    /// Re-read every recorded object in `zone` and compare its hash.
    #[instrument(skip(self))]
    pub async fn audit_hashes(&self, zone: Zone) -> Result<HashAudit> {
        let expected: Vec<(String, String)> = match zone {
            Zone::Landing => self
                .store
                .list_acquired()
                .await?
                .into_iter()
                .filter_map(|r| r.artifact.map(|a| (a.file_path, a.file_hash)))
                .collect(),
            Zone::Curated => self
                .store
                .list_curated()
                .await?
                .into_iter()
                .map(|c| (c.file_path, c.file_hash))
                .collect(),
        };
        let blobs = match zone {
            Zone::Landing => &self.landing,
            Zone::Curated => &self.curated,
        };

        let mut audit = HashAudit::default();
        for (key, hash) in expected {
            audit.checked += 1;
            match blobs.get(&key).await? {
                None => audit.missing.push(key),
                Some(bytes) if content_hash(&bytes) != hash => audit.mismatched.push(key),
                Some(_) => {}
            }
        }

        info!(
            checked = audit.checked,
            missing = audit.missing.len(),
            mismatched = audit.mismatched.len(),
            "hash audit completed"
        );
        Ok(audit)
    }

    pub async fn pipeline_stats(&self) -> Result<PipelineStats> {
        Ok(PipelineStats {
            scraped: self.store.count_decisions().await?,
            downloaded: self.store.count_acquired().await?,
            landing_files: self.landing.count().await?,
            transformed: self.store.count_curated().await?,
            curated_files: self.curated.count().await?,
        })
    }

    pub async fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityRow>> {
        self.store.recent_activity(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tribunal_shared::{DecisionRecord, FileExtension, StoredArtifact, blob_key};
    use tribunal_storage::MemoryBlobStore;
    use uuid::Uuid;

    async fn test_store() -> MetadataStore {
        let tmp = std::env::temp_dir().join(format!("tribunal_report_{}.db", Uuid::now_v7()));
        MetadataStore::open(&tmp).await.unwrap()
    }

    async fn seed(store: &MetadataStore, blobs: &MemoryBlobStore, identifier: &str, acquired: bool) {
        store
            .upsert_decision(&DecisionRecord {
                identifier: identifier.into(),
                description: format!("decision {identifier}"),
                ref_no: identifier.into(),
                body: "Workplace Relations Commission".into(),
                published_date: Some("02/02/2024".into()),
                link_to_doc: Some("https://example.com/doc".into()),
                partition_date: "2024-02".into(),
                scraped_at: Utc::now(),
                artifact: None,
            })
            .await
            .unwrap();
        if acquired {
            let key = blob_key("2024-02", identifier, FileExtension::Pdf);
            let bytes = identifier.as_bytes();
            blobs.put("landing-zone", &key, bytes, "application/pdf").await.unwrap();
            store
                .record_artifact(
                    identifier,
                    &StoredArtifact {
                        file_path: key,
                        file_hash: content_hash(bytes),
                        downloaded_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
    }

    fn reporter<'a>(
        store: &'a MetadataStore,
        blobs: &'a MemoryBlobStore,
    ) -> ConsistencyReporter<'a, MemoryBlobStore> {
        ConsistencyReporter::new(
            store,
            BlobZone::new(blobs, "landing-zone"),
            BlobZone::new(blobs, "curated-zone"),
        )
    }

    #[test]
    fn pair_check_difference_is_absolute() {
        let a = PairCheck::new("a", 3, "b", 5);
        assert!(!a.in_sync);
        assert_eq!(a.difference, 2);
        assert!(PairCheck::new("a", 4, "b", 4).in_sync);
    }

    #[tokio::test]
    async fn backlog_shows_as_discovered_drift_only() {
        let store = test_store().await;
        let blobs = MemoryBlobStore::new();
        seed(&store, &blobs, "ADJ-1", true).await;
        seed(&store, &blobs, "ADJ-2", false).await;

        let report = reporter(&store, &blobs).report().await.unwrap();
        assert!(!report.discovered_vs_acquired.in_sync);
        assert_eq!(report.discovered_vs_acquired.difference, 1);
        assert!(report.acquired_vs_landing.in_sync);
        assert!(report.curated_vs_curated_zone.in_sync);
        assert!(!report.all_in_sync());
    }

    #[tokio::test]
    async fn removed_and_tampered_objects_are_detected() {
        let store = test_store().await;
        let blobs = MemoryBlobStore::new();
        seed(&store, &blobs, "ADJ-1", true).await;
        seed(&store, &blobs, "ADJ-2", true).await;
        seed(&store, &blobs, "ADJ-3", true).await;

        assert!(blobs.remove("landing-zone", "2024-02/ADJ-1.pdf").unwrap());
        blobs
            .put("landing-zone", "2024-02/ADJ-2.pdf", b"tampered", "application/pdf")
            .await
            .unwrap();

        let r = reporter(&store, &blobs);
        let report = r.report().await.unwrap();
        assert!(!report.acquired_vs_landing.in_sync);
        assert_eq!(report.acquired_vs_landing.left, 3);
        assert_eq!(report.acquired_vs_landing.right, 2);

        let audit = r.audit_hashes(Zone::Landing).await.unwrap();
        assert_eq!(audit.checked, 3);
        assert_eq!(audit.missing, vec!["2024-02/ADJ-1.pdf"]);
        assert_eq!(audit.mismatched, vec!["2024-02/ADJ-2.pdf"]);
        assert!(!audit.is_clean());

        // Reporting never mutates either side.
        assert_eq!(store.count_acquired().await.unwrap(), 3);
        assert_eq!(blobs.count("landing-zone").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stats_and_activity_for_dashboard() {
        let store = test_store().await;
        let blobs = MemoryBlobStore::new();
        seed(&store, &blobs, "ADJ-1", true).await;
        seed(&store, &blobs, "ADJ-2", false).await;

        let r = reporter(&store, &blobs);
        let stats = r.pipeline_stats().await.unwrap();
        assert_eq!(
            (stats.scraped, stats.downloaded, stats.landing_files, stats.transformed, stats.curated_files),
            (2, 1, 1, 0, 0)
        );
        assert_eq!(r.recent_activity(1).await.unwrap().len(), 1);
        assert!(r.audit_hashes(Zone::Curated).await.unwrap().is_clean());
    }
}
