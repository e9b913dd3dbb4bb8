//! Page fetching.
//!
//! The [`Fetch`] seam keeps the engine testable without a network; the
//! [`HttpFetcher`] is the production implementation. The
//! [`PoliteFetcher`] wraps either with per-host concurrency bounds,
//! adaptive delays, and the retry policy: transport errors and 5xx are
//! retried with back-off, 4xx are terminal.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use quarry_core::error::{ExternalService, QuarryError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// One fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
    /// Content-Type header, when present.
    pub content_type: Option<String>,
    /// Wall time of the request.
    pub elapsed: Duration,
}

/// Transport seam.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch one URL. Transport failures are errors; HTTP error statuses
    /// are returned as pages.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// reqwest-backed fetcher.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fetcher with the crawler's user agent and a hard request timeout.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot initialise.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("quarry-crawler/0.4 (+https://github.com/quarry-rag/quarry)")
            .timeout(timeout)
            .build()
            .map_err(|e| {
                QuarryError::external(
                    ExternalService::Scrape,
                    format!("http client init failed: {e}"),
                    false,
                )
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let started = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            QuarryError::external(
                ExternalService::Scrape,
                format!("fetch of {url} failed: {e}"),
                true,
            )
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                QuarryError::external(
                    ExternalService::Scrape,
                    format!("body read of {url} failed: {e}"),
                    true,
                )
            })?
            .to_vec();

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
            content_type,
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Debug)]
struct HostState {
    delay: Duration,
    last_request: Option<Instant>,
    consecutive_errors: u32,
}

/// Politeness wrapper: per-host concurrency bound and adaptive delay.
pub struct PoliteFetcher {
    inner: Arc<dyn Fetch>,
    base_delay: Duration,
    max_retries: u32,
    hosts: DashMap<String, Arc<Mutex<HostState>>>,
    permits: DashMap<String, Arc<Semaphore>>,
    host_concurrency: usize,
}

impl std::fmt::Debug for PoliteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoliteFetcher")
            .field("base_delay", &self.base_delay)
            .field("host_concurrency", &self.host_concurrency)
            .finish_non_exhaustive()
    }
}

/// Response slower than this lengthens the host delay.
const SLOW_RESPONSE: Duration = Duration::from_millis(2000);
const MAX_DELAY: Duration = Duration::from_secs(30);

impl PoliteFetcher {
    /// Wrap a transport with politeness bounds.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Fetch>,
        base_delay: Duration,
        host_concurrency: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            inner,
            base_delay,
            max_retries,
            hosts: DashMap::new(),
            permits: DashMap::new(),
            host_concurrency: host_concurrency.max(1),
        }
    }

    fn host_of(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn host_state(&self, host: &str) -> Arc<Mutex<HostState>> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HostState {
                    delay: self.base_delay,
                    last_request: None,
                    consecutive_errors: 0,
                }))
            })
            .clone()
    }

    fn host_permits(&self, host: &str) -> Arc<Semaphore> {
        self.permits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.host_concurrency)))
            .clone()
    }

    /// Current adaptive delay for a host.
    #[must_use]
    pub fn current_delay(&self, host: &str) -> Duration {
        self.host_state(host).lock().delay
    }

    async fn wait_for_slot(&self, host: &str) {
        let wait = {
            let state = self.host_state(host);
            let state = state.lock();
            state.last_request.map_or(Duration::ZERO, |last| {
                state.delay.saturating_sub(last.elapsed())
            })
        };
        if wait > Duration::ZERO {
            tokio::time::sleep(wait).await;
        }
    }

    fn record_outcome(&self, host: &str, elapsed: Duration, ok: bool) {
        let state = self.host_state(host);
        let mut state = state.lock();
        state.last_request = Some(Instant::now());
        if ok {
            state.consecutive_errors = 0;
            if elapsed > SLOW_RESPONSE {
                state.delay = (state.delay * 2).min(MAX_DELAY);
            } else if state.delay > self.base_delay {
                // Shorten cautiously, never below the configured floor.
                state.delay = (state.delay * 3 / 4).max(self.base_delay);
            }
        } else {
            state.consecutive_errors += 1;
            state.delay = (state.delay * 2).min(MAX_DELAY);
        }
    }

    /// Fetch with politeness and retries.
    ///
    /// # Errors
    ///
    /// Terminal 4xx statuses come back as non-retryable errors; transport
    /// failures and 5xx bubble up once the retry budget is spent.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let host = Self::host_of(url);
        let permits = self.host_permits(&host);
        let _permit = permits.acquire().await.map_err(|_| {
            QuarryError::external(ExternalService::Scrape, "fetcher shut down", false)
        })?;

        let mut attempt = 0;
        loop {
            self.wait_for_slot(&host).await;

            let outcome = self.inner.fetch(url).await;
            match outcome {
                Ok(page) if page.status >= 500 => {
                    self.record_outcome(&host, page.elapsed, false);
                    if attempt >= self.max_retries {
                        return Err(QuarryError::external(
                            ExternalService::Scrape,
                            format!("{url} returned {} after {attempt} retries", page.status),
                            false,
                        ));
                    }
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(url, status = page.status, attempt, "server error, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Ok(page) if page.status >= 400 => {
                    self.record_outcome(&host, page.elapsed, true);
                    // Client errors are terminal; retrying cannot help.
                    return Err(QuarryError::external(
                        ExternalService::Scrape,
                        format!("{url} returned {}", page.status),
                        false,
                    ));
                }
                Ok(page) => {
                    self.record_outcome(&host, page.elapsed, true);
                    debug!(url, status = page.status, "fetched");
                    return Ok(page);
                }
                Err(e) => {
                    self.record_outcome(&host, Duration::ZERO, false);
                    if attempt >= self.max_retries || !e.is_retryable() {
                        return Err(e);
                    }
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(url, attempt, "transport error, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Fetch, FetchedPage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use quarry_core::error::{ExternalService, QuarryError, Result};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Scripted fetcher serving canned pages.
    #[derive(Debug, Default)]
    pub struct StubFetcher {
        pages: HashMap<String, (u16, Vec<u8>)>,
        pub fetch_log: Mutex<Vec<String>>,
        /// Statuses to serve before the canned page, per URL.
        pub flaky: Mutex<HashMap<String, Vec<u16>>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, status: u16, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (status, body.as_bytes().to_vec()));
            self
        }

        pub fn fetched(&self) -> Vec<String> {
            self.fetch_log.lock().clone()
        }
    }

    #[async_trait]
    impl Fetch for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.fetch_log.lock().push(url.to_string());

            if let Some(queued) = self.flaky.lock().get_mut(url) {
                if let Some(status) = queued.pop() {
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        status,
                        body: Vec::new(),
                        content_type: None,
                        elapsed: Duration::from_millis(1),
                    });
                }
            }

            match self.pages.get(url) {
                Some((status, body)) => Ok(FetchedPage {
                    url: url.to_string(),
                    status: *status,
                    body: body.clone(),
                    content_type: Some("text/html".to_string()),
                    elapsed: Duration::from_millis(1),
                }),
                None => Err(QuarryError::external(
                    ExternalService::Scrape,
                    format!("no route to {url}"),
                    false,
                )),
            }
        }
    }
}
