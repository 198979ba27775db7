//! Application configuration for the tribunal pipeline.
//!
//! User config lives at `~/.tribunal/tribunal.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TribunalError};
use crate::types::Granularity;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tribunal.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tribunal";

// ---------------------------------------------------------------------------
// Config structs (matching tribunal.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Search source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Discovery crawl settings.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// HTTP retry settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Metadata database and blob zone locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Document acquisition settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Origin of the search interface and case documents.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Issuing authority recorded when a result row names none.
    #[serde(default = "default_body_name")]
    pub body_name: String,

    /// User-Agent header for all outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout for search pages.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            body_name: default_body_name(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.workplacerelations.ie".into()
}
fn default_body_name() -> String {
    "Workplace Relations Commission".into()
}

/// Default agent for search and document requests.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn default_user_agent() -> String {
    BROWSER_USER_AGENT.into()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Default partition granularity.
    #[serde(default = "default_partition")]
    pub partition: Granularity,

    /// Base delay between outbound search requests.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Scale each delay by a random factor in [0.5, 1.5].
    #[serde(default = "default_true")]
    pub randomize_delay: bool,

    /// Hard stop for pagination within one window.
    #[serde(default = "default_max_pages")]
    pub max_pages_per_window: u32,

    /// Where zero-result pages are saved for diagnosis.
    #[serde(default = "default_debug_dir")]
    pub debug_dir: String,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            request_delay_ms: default_request_delay(),
            randomize_delay: true,
            max_pages_per_window: default_max_pages(),
            debug_dir: default_debug_dir(),
        }
    }
}

fn default_partition() -> Granularity {
    Granularity::Monthly
}
fn default_request_delay() -> u64 {
    1500
}
fn default_true() -> bool {
    true
}
fn default_max_pages() -> u32 {
    500
}
fn default_debug_dir() -> String {
    "debug".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Status codes treated as transient.
    #[serde(default = "default_retry_codes")]
    pub retry_http_codes: Vec<u16>,

    /// Backoff before the first retry; doubles per attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap, before jitter.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_http_codes: default_retry_codes(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_codes() -> Vec<u16> {
    vec![500, 502, 503, 504, 522, 524, 408, 429]
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30_000
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the database and both blob zones.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Metadata database file name, relative to `data_dir`.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Bucket holding raw, as-fetched documents.
    #[serde(default = "default_landing_bucket")]
    pub landing_bucket: String,

    /// Bucket holding cleaned documents.
    #[serde(default = "default_curated_bucket")]
    pub curated_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            landing_bucket: default_landing_bucket(),
            curated_bucket: default_curated_bucket(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.tribunal/data".into()
}
fn default_database_file() -> String {
    "tribunal.db".into()
}
fn default_landing_bucket() -> String {
    "landing-zone".into()
}
fn default_curated_bucket() -> String {
    "curated-zone".into()
}

impl StorageConfig {
    /// `data_dir` with a leading `~` expanded to the home directory.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        expand_home(&self.data_dir)
    }

    /// Full path of the metadata database.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.database_file))
    }

    /// Root directory under which blob buckets are created.
    pub fn blob_root(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join("blobs"))
    }
}

/// `[acquisition]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Fixed pause between document fetches.
    #[serde(default = "default_request_delay")]
    pub delay_ms: u64,

    /// Per-document fetch timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_request_delay(),
            timeout_secs: default_request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Outbound HTTP behaviour shared by discovery and acquisition.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Minimum spacing between requests, in ms.
    pub delay_ms: u64,
    /// Jitter the spacing by a factor in [0.5, 1.5].
    pub randomize_delay: bool,
    pub max_retries: u32,
    pub retry_http_codes: Vec<u16>,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl HttpConfig {
    /// HTTP settings for search-page requests.
    pub fn for_discovery(config: &AppConfig) -> Self {
        Self {
            user_agent: config.source.user_agent.clone(),
            timeout_secs: config.source.request_timeout_secs,
            delay_ms: config.crawl.request_delay_ms,
            randomize_delay: config.crawl.randomize_delay,
            max_retries: config.retry.max_retries,
            retry_http_codes: config.retry.retry_http_codes.clone(),
            retry_base_delay_ms: config.retry.base_delay_ms,
            retry_max_delay_ms: config.retry.max_delay_ms,
        }
    }

    /// HTTP settings for document downloads: fixed pacing, own timeout.
    pub fn for_acquisition(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.acquisition.timeout_secs,
            delay_ms: config.acquisition.delay_ms,
            randomize_delay: false,
            ..Self::for_discovery(config)
        }
    }
}

/// Runtime discovery configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    pub body_name: String,
    pub granularity: Granularity,
    pub max_pages_per_window: u32,
    pub debug_dir: PathBuf,
    pub http: HttpConfig,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.source.base_url.clone(),
            body_name: config.source.body_name.clone(),
            granularity: config.crawl.partition,
            max_pages_per_window: config.crawl.max_pages_per_window,
            debug_dir: PathBuf::from(&config.crawl.debug_dir),
            http: HttpConfig::for_discovery(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| TribunalError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Get the path to the config directory (`~/.tribunal/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TribunalError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tribunal/tribunal.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TribunalError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        TribunalError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Reject configs that would make the pipeline misbehave.
pub fn validate(config: &AppConfig) -> Result<()> {
    if !config.source.base_url.starts_with("http://") && !config.source.base_url.starts_with("https://")
    {
        return Err(TribunalError::config(format!(
            "source.base_url must be an http(s) URL, got '{}'",
            config.source.base_url
        )));
    }
    if config.storage.landing_bucket == config.storage.curated_bucket {
        return Err(TribunalError::config(
            "storage.landing_bucket and storage.curated_bucket must differ",
        ));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TribunalError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TribunalError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TribunalError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("landing-zone"));
        assert!(toml_str.contains("retry_http_codes"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_retries, 3);
        assert_eq!(parsed.crawl.partition, Granularity::Monthly);
        assert_eq!(parsed.storage.curated_bucket, "curated-zone");
    }

    #[test]
    fn default_user_agent_is_a_browser_string() {
        let config = AppConfig::default();
        assert!(config.source.user_agent.starts_with("Mozilla/5.0 (X11; Linux x86_64)"));
        assert!(config.source.user_agent.ends_with("Chrome/120.0.0.0 Safari/537.36"));
        assert!(!config.source.user_agent.contains("  "));
        assert_eq!(HttpConfig::for_acquisition(&config).user_agent, BROWSER_USER_AGENT);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[source]
base_url = "http://127.0.0.1:8080"

[crawl]
partition = "weekly"
request_delay_ms = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.source.body_name, "Workplace Relations Commission");
        assert_eq!(config.crawl.partition, Granularity::Weekly);
        assert_eq!(config.crawl.max_pages_per_window, 500);
        assert_eq!(config.acquisition.delay_ms, 1500);
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.granularity, Granularity::Monthly);
        assert_eq!(crawl.http.delay_ms, 1500);
        assert!(crawl.http.randomize_delay);
        assert_eq!(crawl.http.retry_http_codes.len(), 8);
    }

    #[test]
    fn acquisition_http_uses_fixed_pacing() {
        let app = AppConfig::default();
        let http = HttpConfig::for_acquisition(&app);
        assert!(!http.randomize_delay);
        assert_eq!(http.timeout_secs, 30);
    }

    #[test]
    fn validation_rejects_shared_bucket() {
        let mut config = AppConfig::default();
        config.storage.curated_bucket = config.storage.landing_bucket.clone();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/tribunal").unwrap(),
            PathBuf::from("/var/lib/tribunal")
        );
    }
}
