//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tribunal_core::{
    AcquireOptions, AcquisitionWorker, BatchSummary, ConsistencyReporter, ExportFormat,
    PipelineOptions, ProgressReporter, TransformOptions, TransformWorker, Zone, acquisition_stats,
    open_blobs, open_metadata, open_metadata_readonly, render_decisions, run_pipeline,
    transform_stats,
};
use tribunal_crawler::DiscoveryCrawler;
use tribunal_shared::{AppConfig, CrawlConfig, Granularity, HttpConfig, init_config, load_config};
use tribunal_storage::{BlobZones, SearchQuery};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tribunal: collect, store and clean published tribunal decisions.
#[derive(Parser)]
#[command(
    name = "tribunal",
    version,
    about = "Discover, acquire and clean published tribunal decisions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Export file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ExportFormatArg {
    Json,
    Csv,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Csv => ExportFormat::Csv,
        }
    }
}

/// Date bounds and selection flags shared by the batch stages.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct StageArgs {
    /// Earliest published date (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Latest published date (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Maximum number of records to process.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Reprocess records that already have stage output.
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Print stage statistics and exit.
    #[arg(long)]
    pub stats: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl the search interface and record discovered decisions.
    Discover {
        /// First day to search (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to search (YYYY-MM-DD). Defaults to `--from`.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Partition granularity: daily, weekly or monthly.
        #[arg(long)]
        partition: Option<Granularity>,
    },

    /// Download documents for discovered decisions into the landing zone.
    Acquire {
        #[command(flatten)]
        args: StageArgs,

        /// Also select decisions without a document link.
        #[arg(long)]
        include_unlinked: bool,
    },

    /// Clean acquired documents into the curated zone.
    Transform {
        #[command(flatten)]
        args: StageArgs,
    },

    /// Compare metadata counts against blob zone contents.
    Report {
        /// Re-read stored objects and compare their hashes.
        #[arg(long)]
        verify_hashes: bool,

        /// Exit non-zero when any check is out of sync.
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run discovery, acquisition and transformation in order.
    Run {
        /// First day to search (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to search (YYYY-MM-DD). Defaults to `--from`.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Maximum number of records per downstream stage.
        #[arg(long)]
        limit: Option<u32>,

        /// Reprocess records that already have stage output.
        #[arg(long)]
        no_skip_existing: bool,
    },

    /// Inspect stored decisions.
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Query subcommands.
#[derive(Subcommand)]
pub(crate) enum QueryAction {
    /// Counts by body, partition, case type, published month and scrape
    /// day, plus the latest discoveries.
    Stats,
    /// Search identifiers and descriptions.
    Search {
        /// Case-insensitive text to look for.
        text: Option<String>,

        /// Exact issuing body.
        #[arg(long)]
        body: Option<String>,

        /// Lowest partition label, e.g. 2024-01.
        #[arg(long)]
        from_partition: Option<String>,

        /// Highest partition label, e.g. 2024-06.
        #[arg(long)]
        to_partition: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Export every decision as JSON or CSV.
    Export {
        /// Output file (stdout when omitted).
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormatArg,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tribunal=info",
        1 => "tribunal=debug",
        _ => "tribunal=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover {
            from,
            to,
            partition,
        } => cmd_discover(from, to, partition).await,
        Command::Acquire {
            args,
            include_unlinked,
        } => cmd_acquire(&args, include_unlinked).await,
        Command::Transform { args } => cmd_transform(&args).await,
        Command::Report {
            verify_hashes,
            strict,
            json,
        } => cmd_report(verify_hashes, strict, json).await,
        Command::Run {
            from,
            to,
            limit,
            no_skip_existing,
        } => cmd_run(from, to, limit, !no_skip_existing).await,
        Command::Query { action } => cmd_query(action).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Default discovery range: yesterday, or `[from, from]`.
fn discovery_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
    let start = match from {
        Some(d) => d,
        None => Local::now()
            .date_naive()
            .pred_opt()
            .ok_or_else(|| eyre!("cannot compute yesterday's date"))?,
    };
    Ok((start, to.unwrap_or(start)))
}

// ---------------------------------------------------------------------------
// Stage handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    partition: Option<Granularity>,
) -> Result<()> {
    let config = load_config()?;
    let (start, end) = discovery_range(from, to)?;
    let mut crawl_config = CrawlConfig::from(&config);
    if let Some(granularity) = partition {
        crawl_config.granularity = granularity;
    }

    info!(%start, %end, granularity = %crawl_config.granularity, "starting discovery");

    let store = open_metadata(&config).await?;
    let report = DiscoveryCrawler::new(crawl_config)?
        .crawl(start, end, &store)
        .await?;

    println!();
    println!("  Discovery finished");
    println!("  Windows:       {}", report.windows);
    println!("  Pages:         {}", report.pages_fetched);
    println!("  Upserted:      {}", report.records_upserted);
    println!("  Rows skipped:  {}", report.rows_skipped);
    println!("  Empty pages:   {}", report.empty_pages);
    println!("  Store errors:  {}", report.store_errors);
    for window in &report.failed_windows {
        println!("  Failed window: {window}");
    }
    println!();

    Ok(())
}

async fn cmd_acquire(args: &StageArgs, include_unlinked: bool) -> Result<()> {
    let config = load_config()?;
    if args.stats {
        let store = open_metadata_readonly(&config).await?;
        let stats = acquisition_stats(&store).await?;
        println!();
        println!("  Total decisions: {}", stats.total);
        println!("  Downloaded:      {}", stats.downloaded);
        println!("  Pending:         {}", stats.pending);
        println!("  Progress:        {:.1}%", stats.pct);
        println!();
        return Ok(());
    }

    let store = open_metadata(&config).await?;
    let blobs = open_blobs(&config)?;
    let zones = BlobZones::new(
        &blobs,
        &config.storage.landing_bucket,
        &config.storage.curated_bucket,
    );

    let opts = AcquireOptions {
        from: args.from,
        to: args.to,
        limit: args.limit,
        skip_existing: !args.no_skip_existing,
        include_unlinked,
    };
    let reporter = CliProgress::new();
    let summary = AcquisitionWorker::new(&store, zones.landing, &HttpConfig::for_acquisition(&config))?
        .run(&opts, &reporter)
        .await?;

    print_summary(&summary);
    Ok(())
}

async fn cmd_transform(args: &StageArgs) -> Result<()> {
    let config = load_config()?;
    if args.stats {
        let store = open_metadata_readonly(&config).await?;
        let stats = transform_stats(&store).await?;
        println!();
        println!("  Acquired:    {}", stats.landing_with_files);
        println!("  Curated:     {}", stats.curated_total);
        println!("  Pending:     {}", stats.pending);
        println!("  Progress:    {:.1}%", stats.pct);
        println!();
        return Ok(());
    }

    let store = open_metadata(&config).await?;
    let blobs = open_blobs(&config)?;
    let zones = BlobZones::new(
        &blobs,
        &config.storage.landing_bucket,
        &config.storage.curated_bucket,
    );

    let opts = TransformOptions {
        from: args.from,
        to: args.to,
        limit: args.limit,
        skip_existing: !args.no_skip_existing,
    };
    let reporter = CliProgress::new();
    let summary = TransformWorker::new(&store, zones.landing, zones.curated)
        .run(&opts, &reporter)
        .await?;

    print_summary(&summary);
    Ok(())
}

async fn cmd_report(verify_hashes: bool, strict: bool, json: bool) -> Result<()> {
    let config = load_config()?;
    let store = open_metadata_readonly(&config).await?;
    let blobs = open_blobs(&config)?;
    let zones = BlobZones::new(
        &blobs,
        &config.storage.landing_bucket,
        &config.storage.curated_bucket,
    );
    let reporter = ConsistencyReporter::new(&store, zones.landing, zones.curated);
    let report = reporter.report().await?;

    let audits = if verify_hashes {
        Some((
            reporter.audit_hashes(Zone::Landing).await?,
            reporter.audit_hashes(Zone::Curated).await?,
        ))
    } else {
        None
    };

    if json {
        let value = serde_json::json!({
            "consistency": report,
            "all_in_sync": report.all_in_sync(),
            "landing_audit": audits.as_ref().map(|(l, _)| l),
            "curated_audit": audits.as_ref().map(|(_, c)| c),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!();
        for check in report.checks() {
            let status = if check.in_sync {
                "in sync".to_string()
            } else {
                format!("OUT OF SYNC by {}", check.difference)
            };
            println!(
                "  {:<16} {:>8}  vs  {:<16} {:>8}   {status}",
                check.left_label, check.left, check.right_label, check.right
            );
        }
        if let Some((landing, curated)) = &audits {
            for (zone, audit) in [("landing", landing), ("curated", curated)] {
                println!(
                    "  {zone} hashes: {} checked, {} missing, {} mismatched",
                    audit.checked,
                    audit.missing.len(),
                    audit.mismatched.len()
                );
                for key in &audit.missing {
                    println!("    missing:    {key}");
                }
                for key in &audit.mismatched {
                    println!("    mismatched: {key}");
                }
            }
        }
        println!();
    }

    let audits_clean = audits
        .as_ref()
        .is_none_or(|(l, c)| l.is_clean() && c.is_clean());
    if strict && !(report.all_in_sync() && audits_clean) {
        return Err(eyre!("metadata and blob zones are out of sync"));
    }
    Ok(())
}

async fn cmd_run(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<u32>,
    skip_existing: bool,
) -> Result<()> {
    let config = load_config()?;
    let (start, end) = discovery_range(from, to)?;
    let store = open_metadata(&config).await?;
    let blobs = open_blobs(&config)?;

    info!(%start, %end, "starting pipeline run");

    let reporter = CliProgress::new();
    let result = run_pipeline(
        &config,
        &store,
        &blobs,
        &PipelineOptions {
            start,
            end,
            limit,
            skip_existing,
        },
        &reporter,
    )
    .await?;

    println!();
    println!("  Pipeline finished");
    println!("  Discovered:  {}", result.discovery.records_upserted);
    println!(
        "  Acquired:    {} ({} errors)",
        result.acquisition.success, result.acquisition.errors
    );
    println!(
        "  Curated:     {} ({} errors)",
        result.transformation.success, result.transformation.errors
    );
    println!(
        "  In sync:     {}",
        if result.consistency.all_in_sync() { "yes" } else { "no" }
    );
    println!("  Time:        {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_query(action: QueryAction) -> Result<()> {
    let config = load_config()?;
    let store = open_metadata_readonly(&config).await?;

    match action {
        QueryAction::Stats => {
            println!();
            println!("  Total decisions: {}", store.count_decisions().await?);
            println!("  Without link:    {}", store.count_unlinked().await?);
            println!();
            println!("  By body:");
            for (body, count) in store.counts_by_body().await? {
                println!("    {count:>8}  {body}");
            }
            println!("  By partition:");
            for (partition, count) in store.counts_by_partition().await? {
                println!("    {count:>8}  {partition}");
            }
            println!("  By case type:");
            for (case_type, count) in store.counts_by_case_type().await? {
                println!("    {count:>8}  {case_type}");
            }
            println!("  By published month:");
            for (month, count) in store.counts_by_published_month().await? {
                println!("    {count:>8}  {month}");
            }
            println!("  Scraped per day:");
            for (day, count) in store.counts_by_scraped_day().await? {
                println!("    {count:>8}  {day}");
            }
            println!("  Latest:");
            for row in store.recent_activity(10).await? {
                println!(
                    "    {:<16} {:<12} {}",
                    row.identifier,
                    row.published_date.as_deref().unwrap_or("-"),
                    row.description
                );
            }
            println!();
        }
        QueryAction::Search {
            text,
            body,
            from_partition,
            to_partition,
            limit,
        } => {
            let results = store
                .search(&SearchQuery {
                    text,
                    body,
                    partition_from: from_partition,
                    partition_to: to_partition,
                    limit,
                })
                .await?;
            for record in &results {
                println!(
                    "{:<16} {:<12} {:<8} {}",
                    record.identifier,
                    record.published_date.as_deref().unwrap_or("-"),
                    record.partition_date,
                    record.description
                );
            }
            info!(matches = results.len(), "search finished");
        }
        QueryAction::Export { out, format } => {
            let records = store.list_decisions().await?;
            let rendered = render_decisions(&records, format.into())?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Exported {} decisions to {}", records.len(), path.display());
                }
                None if rendered.ends_with('\n') => print!("{rendered}"),
                None => println!("{rendered}"),
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("  {} finished", summary.stage);
    println!("  Selected: {}", summary.selected);
    println!("  Success:  {}", summary.success);
    println!("  Errors:   {}", summary.errors);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar per stage.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, name: &str, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_prefix(name.to_string());
        self.bar.set_message(String::new());
    }

    fn item(&self, identifier: &str, current: u64, _total: u64) {
        self.bar.set_position(current);
        self.bar.set_message(identifier.to_string());
    }

    fn done(&self, summary: &BatchSummary) {
        self.bar.set_message(format!(
            "{} ok, {} errors",
            summary.success, summary.errors
        ));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config handlers
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn stage_flags_parse() {
        let cli = Cli::try_parse_from([
            "tribunal",
            "acquire",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
            "--limit",
            "5",
            "--no-skip-existing",
            "--include-unlinked",
        ])
        .unwrap();
        match cli.command {
            Command::Acquire {
                args,
                include_unlinked,
            } => {
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(args.limit, Some(5));
                assert!(args.no_skip_existing);
                assert!(include_unlinked);
                assert!(!args.stats);
            }
            _ => panic!("expected acquire"),
        }
    }

    #[test]
    fn partition_flag_uses_granularity_parser() {
        let cli =
            Cli::try_parse_from(["tribunal", "discover", "--partition", "weekly"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Discover {
                partition: Some(Granularity::Weekly),
                ..
            }
        ));
        assert!(Cli::try_parse_from(["tribunal", "discover", "--partition", "hourly"]).is_err());
    }

    #[test]
    fn export_format_defaults_to_json_and_accepts_csv() {
        let cli = Cli::try_parse_from(["tribunal", "query", "export"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Query {
                action: QueryAction::Export {
                    format: ExportFormatArg::Json,
                    out: None,
                },
            }
        ));

        let cli = Cli::try_parse_from([
            "tribunal", "query", "export", "--format", "csv", "--out", "d.csv",
        ])
        .unwrap();
        match cli.command {
            Command::Query {
                action: QueryAction::Export { out, format },
            } => {
                assert_eq!(ExportFormat::from(format), ExportFormat::Csv);
                assert_eq!(out, Some(PathBuf::from("d.csv")));
            }
            _ => panic!("expected query export"),
        }
        assert!(Cli::try_parse_from(["tribunal", "query", "export", "--format", "xml"]).is_err());
    }

    #[test]
    fn discovery_range_defaults_to_single_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(discovery_range(Some(day), None).unwrap(), (day, day));

        let (start, end) = discovery_range(None, None).unwrap();
        assert_eq!(start, end);
        assert!(start < Local::now().date_naive());
    }
}
