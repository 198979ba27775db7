//! Paced HTTP fetching with bounded, jittered retries for transient failures.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use tribunal_shared::{HttpConfig, Result, TribunalError};

/// Maximum jitter added to each backoff delay.
const MAX_JITTER: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Which failures are retried, and how long to back off.
///
/// Delay before retry `n` (1-indexed): `min(base * 2^(n-1), max) + jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    transient_codes: Vec<u16>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            transient_codes: config.retry_http_codes.clone(),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_transient_status(&self, status: u16) -> bool {
        self.transient_codes.contains(&status)
    }

    /// Backoff before retry number `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let scaled = self.base_delay.saturating_mul(1u32 << exponent);
        let capped = scaled.min(self.max_delay);
        let jitter_cap = MAX_JITTER.min(capped).as_millis() as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        capped + Duration::from_millis(jitter)
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Enforces a minimum gap between outbound requests.
///
/// With `randomize`, each gap is drawn from `[0.5, 1.5] * delay`.
#[derive(Debug)]
struct Pacer {
    delay: Duration,
    randomize: bool,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(delay: Duration, randomize: bool) -> Self {
        Self {
            delay,
            randomize,
            last: Mutex::new(None),
        }
    }

    fn next_gap(&self) -> Duration {
        if !self.randomize || self.delay.is_zero() {
            return self.delay;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
        self.delay.mul_f64(factor)
    }

    /// Wait until the next request may be sent, then claim the slot.
    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.next_gap();
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// A successfully fetched response body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    /// Declared `Content-Type`, empty when absent.
    pub content_type: String,
    /// URL after redirects.
    pub final_url: Url,
}

/// HTTP client shared by discovery and acquisition.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TribunalError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_config(config),
            pacer: Pacer::new(
                Duration::from_millis(config.delay_ms),
                config.randomize_delay,
            ),
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url`, retrying transient failures up to the configured bound.
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody> {
        let mut retry = 0u32;
        loop {
            self.pacer.wait().await;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && retry < self.retry.max_retries() => {
                    retry += 1;
                    let delay = self.retry.delay_for(retry);
                    warn!(
                        %url,
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedBody> {
        debug!(%url, "fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            return Err(TribunalError::http_status(
                url,
                code,
                self.retry.is_transient_status(code),
            ));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TribunalError::network(url, format!("body read failed: {e}"), true))?;

        Ok(FetchedBody {
            bytes: bytes.to_vec(),
            content_type,
            final_url,
        })
    }
}

/// Timeouts and connection failures are transient; malformed requests are not.
fn classify_reqwest_error(url: &str, e: &reqwest::Error) -> TribunalError {
    let transient = e.is_timeout() || e.is_connect() || e.is_request();
    let transient = transient && !e.is_builder();
    TribunalError::network(url, e.to_string(), transient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(max_retries: u32) -> HttpConfig {
        HttpConfig {
            user_agent: "tribunal-test".into(),
            timeout_secs: 5,
            delay_ms: 0,
            randomize_delay: false,
            max_retries,
            retry_http_codes: vec![500, 502, 503, 504, 522, 524, 408, 429],
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            transient_codes: vec![503],
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
        };
        let jitter = MAX_JITTER;
        let d1 = policy.delay_for(1);
        let d2 = policy.delay_for(2);
        let d3 = policy.delay_for(3);
        assert!(d1 >= Duration::from_millis(1000) && d1 <= Duration::from_millis(1000) + jitter);
        assert!(d2 >= Duration::from_millis(2000) && d2 <= Duration::from_millis(2000) + jitter);
        assert!(d3 >= Duration::from_millis(3000) && d3 <= Duration::from_millis(3000) + jitter);
    }

    #[test]
    fn transient_codes_come_from_config() {
        let policy = RetryPolicy::from_config(&test_config(3));
        assert!(policy.is_transient_status(503));
        assert!(policy.is_transient_status(429));
        assert!(!policy.is_transient_status(404));
    }

    #[tokio::test]
    async fn pacer_spaces_requests() {
        let pacer = Pacer::new(Duration::from_millis(40), false);
        let start = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(3)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/doc", server.uri()))
            .await
            .unwrap();
        assert_eq!(body.bytes, b"%PDF-1.4");
        assert_eq!(body.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn retry_exhaustion_returns_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(2)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, TribunalError::Fetch { status: Some(502), .. }));
    }

    #[tokio::test]
    async fn permanent_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(3)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
