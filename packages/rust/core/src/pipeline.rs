//! End-to-end run: discovery → acquisition → transformation → consistency report.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{info, instrument};

use tribunal_crawler::{DiscoveryCrawler, DiscoveryReport, PartitionPlanner};
use tribunal_shared::{AppConfig, CrawlConfig, HttpConfig, Result, TribunalError};
use tribunal_storage::{BlobStore, BlobZones, FsBlobStore, MetadataStore};

use crate::acquire::{AcquireOptions, AcquisitionWorker};
use crate::progress::{BatchSummary, ProgressReporter};
use crate::report::{ConsistencyReport, ConsistencyReporter};
use crate::transform::{TransformOptions, TransformWorker};

/// Scope of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// First discovery day (inclusive).
    pub start: NaiveDate,
    /// Last discovery day (inclusive).
    pub end: NaiveDate,
    /// Cap on records per downstream stage.
    pub limit: Option<u32>,
    pub skip_existing: bool,
}

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub discovery: DiscoveryReport,
    pub acquisition: BatchSummary,
    pub transformation: BatchSummary,
    pub consistency: ConsistencyReport,
    pub elapsed: Duration,
}

/// Open (and migrate) the metadata database named by the config.
pub async fn open_metadata(config: &AppConfig) -> Result<MetadataStore> {
    let db_path = config.storage.database_path()?;
    ensure_parent(&db_path)?;
    MetadataStore::open(&db_path).await
}

/// Open the metadata database without write access.
pub async fn open_metadata_readonly(config: &AppConfig) -> Result<MetadataStore> {
    let db_path = config.storage.database_path()?;
    if !db_path.exists() {
        return Err(TribunalError::config(format!(
            "no metadata database at {}; run `tribunal discover` first",
            db_path.display()
        )));
    }
    MetadataStore::open_readonly(&db_path).await
}

/// Filesystem blob store rooted under the configured data directory.
pub fn open_blobs(config: &AppConfig) -> Result<FsBlobStore> {
    Ok(FsBlobStore::new(config.storage.blob_root()?))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TribunalError::io(parent, e))?;
    }
    Ok(())
}

/// Run every stage in order, stopping at the first stage-level error.
///
/// Per-item failures inside a stage are counted in its summary and never
/// stop the run.
#[instrument(skip_all, fields(start = %opts.start, end = %opts.end))]
pub async fn run_pipeline<B: BlobStore>(
    config: &AppConfig,
    store: &MetadataStore,
    blobs: &B,
    opts: &PipelineOptions,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let started = Instant::now();
    let zones = BlobZones::new(
        blobs,
        &config.storage.landing_bucket,
        &config.storage.curated_bucket,
    );

    // --- Discovery ---
    let crawl_config = CrawlConfig::from(config);
    let windows = PartitionPlanner::new(crawl_config.granularity).plan(opts.start, opts.end)?;
    progress.stage("discovery", windows.len() as u64);
    let discovery = DiscoveryCrawler::new(crawl_config)?
        .crawl_windows(&windows, store)
        .await?;

    // --- Acquisition ---
    let acquisition = AcquisitionWorker::new(
        store,
        zones.landing.clone(),
        &HttpConfig::for_acquisition(config),
    )?
    .run(
        &AcquireOptions {
            limit: opts.limit,
            skip_existing: opts.skip_existing,
            ..AcquireOptions::default()
        },
        progress,
    )
    .await?;

    // --- Transformation ---
    let transformation = TransformWorker::new(store, zones.landing.clone(), zones.curated.clone())
        .run(
            &TransformOptions {
                limit: opts.limit,
                skip_existing: opts.skip_existing,
                ..TransformOptions::default()
            },
            progress,
        )
        .await?;

    let consistency = ConsistencyReporter::new(store, zones.landing, zones.curated)
        .report()
        .await?;

    let elapsed = started.elapsed();
    info!(
        records = discovery.records_upserted,
        acquired = acquisition.success,
        curated = transformation.success,
        in_sync = consistency.all_in_sync(),
        elapsed_ms = elapsed.as_millis() as u64,
        "pipeline completed"
    );

    Ok(PipelineResult {
        discovery,
        acquisition,
        transformation,
        consistency,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use tribunal_shared::Granularity;
    use tribunal_storage::MemoryBlobStore;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS: &str = r#"<html><body><ul>
        <li class="each-item"><h2 class="title">ADJ-00001</h2><span class="date">2/1/2024</span>
            <p class="description">Unfair dismissal</p></li>
        <li class="each-item"><h2 class="title">ADJ-00002</h2><span class="date">3/1/2024</span>
            <a class="btn btn-primary" href="/files/adj-00002.pdf">View</a></li>
    </ul></body></html>"#;

    fn test_config(base_url: &str) -> AppConfig {
        let tmp = std::env::temp_dir().join(format!("tribunal-pipeline-{}", Uuid::now_v7()));
        let mut config = AppConfig::default();
        config.source.base_url = base_url.to_string();
        config.crawl.partition = Granularity::Monthly;
        config.crawl.request_delay_ms = 0;
        config.crawl.randomize_delay = false;
        config.crawl.debug_dir = tmp.join("debug").display().to_string();
        config.retry.max_retries = 0;
        config.acquisition.delay_ms = 0;
        config.storage.data_dir = tmp.display().to_string();
        config
    }

    async fn mount_source(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/en/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en/cases/2024/january/adj-00001.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body><nav>x</nav><main><p>Held  for the complainant.</p></main></body></html>"),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/adj-00002.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .expect(1)
            .mount(server)
            .await;
    }

    fn january() -> PipelineOptions {
        PipelineOptions {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            limit: None,
            skip_existing: true,
        }
    }

    #[tokio::test]
    async fn full_run_leaves_stores_consistent() {
        let server = MockServer::start().await;
        mount_source(&server).await;

        let config = test_config(&server.uri());
        let store = open_metadata(&config).await.unwrap();
        let blobs = MemoryBlobStore::new();

        let result = run_pipeline(&config, &store, &blobs, &january(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.discovery.windows, 1);
        assert_eq!(result.discovery.records_upserted, 2);
        assert_eq!((result.acquisition.success, result.acquisition.errors), (2, 0));
        assert_eq!((result.transformation.success, result.transformation.errors), (2, 0));
        assert!(result.consistency.all_in_sync());

        let curated = blobs
            .get("curated-zone", "2024-01/ADJ-00001.html")
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(curated).unwrap().contains("Held for the complainant."));
        assert!(blobs.get("curated-zone", "2024-01/ADJ-00002.pdf").await.unwrap().is_some());

        let runs = store.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.finished_at.is_some()));
    }

    #[tokio::test]
    async fn rerun_only_rediscovers() {
        let server = MockServer::start().await;
        // Documents are fetched once across both runs; search runs twice.
        Mock::given(method("GET"))
            .and(path("/en/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en/cases/2024/january/adj-00001.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>one</p>"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/adj-00002.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let store = open_metadata(&config).await.unwrap();
        let blobs = MemoryBlobStore::new();

        run_pipeline(&config, &store, &blobs, &january(), &SilentProgress)
            .await
            .unwrap();
        let second = run_pipeline(&config, &store, &blobs, &january(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(second.acquisition.selected, 0);
        assert_eq!(second.transformation.selected, 0);
        assert_eq!(store.count_decisions().await.unwrap(), 2);
        assert!(second.consistency.all_in_sync());
    }

    #[tokio::test]
    async fn inverted_range_stops_before_any_stage() {
        let config = test_config("http://127.0.0.1:9");
        let store = open_metadata(&config).await.unwrap();
        let blobs = MemoryBlobStore::new();

        let opts = PipelineOptions {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            limit: None,
            skip_existing: true,
        };
        let err = run_pipeline(&config, &store, &blobs, &opts, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, TribunalError::InvalidRange { .. }));
        assert!(store.recent_runs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filesystem_stores_open_under_data_dir() {
        let config = test_config("http://127.0.0.1:9");
        let store = open_metadata(&config).await.unwrap();
        assert_eq!(store.count_decisions().await.unwrap(), 0);
        let blobs = open_blobs(&config).unwrap();
        assert!(blobs.root().starts_with(config.storage.resolved_data_dir().unwrap()));
    }
}
