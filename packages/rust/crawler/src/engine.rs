//! Discovery crawler: walks partition windows and paginated search results,
//! upserting every parsed decision into the metadata store.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tribunal_shared::{CrawlConfig, DateWindow, DecisionRecord, Result};
use tribunal_storage::MetadataStore;

use crate::extract::{ParsedRow, RowExtractor, search_url};
use crate::http::HttpFetcher;
use crate::partition::PartitionPlanner;

// ---------------------------------------------------------------------------
// DiscoveryReport
// ---------------------------------------------------------------------------

/// Summary of a discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    /// Windows planned for the run.
    pub windows: usize,
    pub pages_fetched: usize,
    /// Successful upserts (an identifier seen twice counts twice).
    pub records_upserted: usize,
    /// Rows with no identifier or unparseable fields.
    pub rows_skipped: usize,
    /// Pages that parsed zero records.
    pub empty_pages: usize,
    /// Upserts that failed.
    pub store_errors: usize,
    /// `{label}:{start}` of windows whose pagination was aborted.
    pub failed_windows: Vec<String>,
}

/// Outcome of one window.
#[derive(Debug, Default)]
struct WindowStats {
    pages: usize,
    upserted: usize,
    skipped: usize,
    empty_pages: usize,
    store_errors: usize,
    aborted: bool,
}

// ---------------------------------------------------------------------------
// DiscoveryCrawler
// ---------------------------------------------------------------------------

/// Searches the source window by window and records what it finds.
pub struct DiscoveryCrawler {
    config: CrawlConfig,
    fetcher: HttpFetcher,
    extractor: RowExtractor,
}

impl DiscoveryCrawler {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.http)?;
        let extractor = RowExtractor::new(&config.base_url, &config.body_name);
        Ok(Self {
            config,
            fetcher,
            extractor,
        })
    }

    /// Plan windows for `[start, end]` and crawl them in order.
    #[instrument(skip_all, fields(%start, %end, granularity = %self.config.granularity))]
    pub async fn crawl(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        store: &MetadataStore,
    ) -> Result<DiscoveryReport> {
        let windows = PartitionPlanner::new(self.config.granularity).plan(start, end)?;
        self.crawl_windows(&windows, store).await
    }

    /// Crawl pre-planned windows. A failed window never stops the next one.
    pub async fn crawl_windows(
        &self,
        windows: &[DateWindow],
        store: &MetadataStore,
    ) -> Result<DiscoveryReport> {
        let run_id = store.insert_run("discovery").await?;
        let mut report = DiscoveryReport {
            windows: windows.len(),
            ..DiscoveryReport::default()
        };

        info!(windows = windows.len(), "starting discovery");

        for window in windows {
            let stats = self.crawl_window(window, store).await;
            report.pages_fetched += stats.pages;
            report.records_upserted += stats.upserted;
            report.rows_skipped += stats.skipped;
            report.empty_pages += stats.empty_pages;
            report.store_errors += stats.store_errors;
            if stats.aborted {
                report
                    .failed_windows
                    .push(format!("{}:{}", window.label, window.start));
            }
        }

        let stats_json = serde_json::to_string(&report).unwrap_or_default();
        if let Err(e) = store.finish_run(&run_id, &stats_json).await {
            warn!(error = %e, "failed to record discovery run");
        }

        info!(
            pages_fetched = report.pages_fetched,
            records_upserted = report.records_upserted,
            rows_skipped = report.rows_skipped,
            empty_pages = report.empty_pages,
            failed_windows = report.failed_windows.len(),
            "discovery completed"
        );

        Ok(report)
    }

    /// Follow pagination for one window until it runs dry.
    #[instrument(skip_all, fields(partition = %window.label, start = %window.start, end = %window.end))]
    async fn crawl_window(&self, window: &DateWindow, store: &MetadataStore) -> WindowStats {
        let mut stats = WindowStats::default();
        let mut visited = HashSet::new();
        let mut url = search_url(&self.config.base_url, window.start, window.end);
        let mut page = 1u32;

        loop {
            if page > self.config.max_pages_per_window {
                warn!(page, "page cap reached, ending window");
                break;
            }
            visited.insert(url.clone());

            let fetched = match self.fetcher.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%url, page, error = %e, "fetch failed, aborting window");
                    stats.aborted = true;
                    break;
                }
            };
            stats.pages += 1;

            let html = String::from_utf8_lossy(&fetched.bytes);
            let parsed = self.extractor.parse_page(&html, &fetched.final_url);
            stats.skipped += parsed.skipped;
            debug!(page, rows = parsed.rows.len(), skipped = parsed.skipped, "page parsed");

            for row in &parsed.rows {
                let record = to_record(row, &window.label);
                match store.upsert_decision(&record).await {
                    Ok(()) => stats.upserted += 1,
                    Err(e) => {
                        warn!(identifier = %row.identifier, error = %e, "upsert failed");
                        stats.store_errors += 1;
                    }
                }
            }

            if parsed.rows.is_empty() {
                warn!(page, "no results on page");
                stats.empty_pages += 1;
                self.save_debug_page(window, page, &fetched.bytes).await;
                break;
            }

            match parsed.next_page {
                Some(next) if !visited.contains(next.as_str()) => {
                    url = next.to_string();
                    page += 1;
                }
                Some(next) => {
                    debug!(%next, "next page already visited, ending window");
                    break;
                }
                None => break,
            }
        }

        stats
    }

    /// Keep a zero-result page for diagnosis. Failures are only logged.
    async fn save_debug_page(&self, window: &DateWindow, page: u32, bytes: &[u8]) {
        let path = debug_page_path(&self.config.debug_dir, window, page);
        if let Err(e) = tokio::fs::create_dir_all(&self.config.debug_dir).await {
            warn!(dir = %self.config.debug_dir.display(), error = %e, "cannot create debug dir");
            return;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => warn!(path = %path.display(), "saved empty result page"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot save debug page"),
        }
    }
}

fn debug_page_path(debug_dir: &std::path::Path, window: &DateWindow, page: u32) -> PathBuf {
    debug_dir.join(format!(
        "response_{}_{}_page{page}.html",
        window.label, window.start
    ))
}

fn to_record(row: &ParsedRow, partition: &str) -> DecisionRecord {
    DecisionRecord {
        identifier: row.identifier.clone(),
        description: row.description.clone(),
        ref_no: row.ref_no.clone(),
        body: row.body.clone(),
        published_date: row.published_date.clone(),
        link_to_doc: row.link_to_doc.clone(),
        partition_date: partition.to_string(),
        scraped_at: Utc::now(),
        artifact: None,
    }
}
