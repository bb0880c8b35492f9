//! NCBI E-utilities client for PubMed.
//!
//! - `esearch.fcgi` (JSON) pages through matching PMIDs
//! - `efetch.fcgi` (XML) returns article details, POSTed in batches
//!
//! NCBI allows 3 requests/s without an API key and 10/s with one, so every
//! request goes through a shared throttle. Transient failures (network, 429,
//! 5xx) are retried with exponential backoff.

use crate::config::{HttpSettings, SearchSettings, Settings};
use crate::error::{PapersError, Result};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// E-utilities base URL
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

/// Upper bound on ids a single search may return
pub const MAX_RESULTS_LIMIT: usize = 10_000;

/// `tool` parameter identifying this client to NCBI
const TOOL_NAME: &str = "get-papers-list";

/// Wait used when a 429 carries no Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

const INTERVAL_WITHOUT_KEY: Duration = Duration::from_millis(350);
const INTERVAL_WITH_KEY: Duration = Duration::from_millis(110);

/// One efetch batch: the ids requested and the raw XML (or why it failed)
#[derive(Debug)]
pub struct FetchOutcome {
    pub ids: Vec<String>,
    pub payload: Result<String>,
}

/// PubMed E-utilities client with throttling and retries
pub struct PubmedClient {
    client: reqwest::Client,
    esearch_url: Url,
    efetch_url: Url,
    api_key: Option<String>,
    email: Option<String>,
    max_retries: u32,
    initial_backoff: Duration,
    page_size: usize,
    batch_size: usize,
    concurrency: usize,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl PubmedClient {
    /// Create a client with default paging and batching
    pub fn new(http: &HttpSettings) -> Result<Self> {
        Self::with_search_settings(http, &SearchSettings::default())
    }

    /// Create a client from the full settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_search_settings(&settings.http, &settings.search)
    }

    fn with_search_settings(http: &HttpSettings, search: &SearchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| PapersError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut base = http.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| PapersError::Config(format!("Invalid base_url '{}': {}", base, e)))?;
        let endpoint = |name: &str| {
            base.join(name)
                .map_err(|e| PapersError::Config(format!("Invalid endpoint {}: {}", name, e)))
        };

        let api_key = http.api_key.clone().filter(|k| !k.trim().is_empty());
        let min_interval = if api_key.is_some() {
            INTERVAL_WITH_KEY
        } else {
            INTERVAL_WITHOUT_KEY
        };

        Ok(Self {
            client,
            esearch_url: endpoint("esearch.fcgi")?,
            efetch_url: endpoint("efetch.fcgi")?,
            api_key,
            email: http.email.clone().filter(|e| !e.trim().is_empty()),
            max_retries: http.max_retries,
            initial_backoff: Duration::from_millis(http.initial_backoff_ms),
            page_size: search.page_size.max(1),
            batch_size: search.batch_size.max(1),
            concurrency: search.concurrency.max(1),
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Override the minimum spacing between requests
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Search PubMed and return up to `max_results` PMIDs.
    ///
    /// Pages through esearch until enough ids are collected or the result
    /// count is exhausted. Zero ids is a `NotFound` error.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PapersError::Validation("Query must not be empty".to_string()));
        }
        if max_results == 0 || max_results > MAX_RESULTS_LIMIT {
            return Err(PapersError::Validation(format!(
                "max_results must be between 1 and {}, got {}",
                MAX_RESULTS_LIMIT, max_results
            )));
        }

        info!(query = query, max_results = max_results, "Searching PubMed");

        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut retstart = 0usize;

        loop {
            let retmax = (max_results - ids.len()).min(self.page_size);
            let page = self.esearch_page(query, retstart, retmax).await?;
            let returned = page.ids.len();

            for id in page.ids {
                if ids.len() >= max_results {
                    break;
                }
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            retstart += returned;
            debug!(
                retstart = retstart,
                collected = ids.len(),
                count = ?page.count,
                "esearch page"
            );

            let exhausted = page.count.is_some_and(|c| retstart >= c);
            if returned == 0 || returned < retmax || exhausted || ids.len() >= max_results {
                break;
            }
        }

        if ids.is_empty() {
            return Err(PapersError::NotFound(query.to_string()));
        }

        info!(count = ids.len(), "Found PubMed ids");
        Ok(ids)
    }

    async fn esearch_page(&self, query: &str, retstart: usize, retmax: usize) -> Result<ESearchPage> {
        let mut params = self.common_params();
        params.extend([
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmode", "json".to_string()),
            ("retstart", retstart.to_string()),
            ("retmax", retmax.to_string()),
        ]);

        let body = self
            .execute("esearch", || self.client.get(self.esearch_url.clone()).query(&params))
            .await?;

        parse_esearch(&body)
    }

    /// Fetch the details of every id, `batch_size` ids per request.
    ///
    /// Batches run with bounded concurrency and come back in input order.
    /// A failed batch is reported in its outcome and does not stop the rest.
    pub async fn fetch_details(&self, ids: &[String]) -> Vec<FetchOutcome> {
        let batches: Vec<Vec<String>> = ids.chunks(self.batch_size).map(|c| c.to_vec()).collect();

        info!(
            ids = ids.len(),
            batches = batches.len(),
            concurrency = self.concurrency,
            "Fetching PubMed details"
        );

        stream::iter(batches)
            .map(|batch| async move {
                let payload = self.fetch_batch(&batch).await;
                if let Err(e) = &payload {
                    warn!(ids = %batch.join(","), error = %e, "efetch batch failed");
                }
                FetchOutcome { ids: batch, payload }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Fetch one batch of ids as raw efetch XML
    pub async fn fetch_batch(&self, ids: &[String]) -> Result<String> {
        if ids.is_empty() {
            return Ok(String::new());
        }

        let mut params = self.common_params();
        params.extend([
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
            ("rettype", "abstract".to_string()),
        ]);

        self.execute("efetch", || self.client.post(self.efetch_url.clone()).form(&params))
            .await
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", TOOL_NAME.to_string())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn execute<F>(&self, endpoint: &str, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            self.wait_for_rate_limit().await;

            match self.send_once(build()).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let jitter_ms = rand::random::<u64>() % (backoff.as_millis() as u64 / 2 + 1);
                    let mut wait = backoff + Duration::from_millis(jitter_ms);
                    if let PapersError::RateLimited(secs) = &e {
                        wait = wait.max(Duration::from_secs(*secs));
                    }
                    warn!(
                        endpoint = endpoint,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let secs = retry_after_secs(response.headers()).unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(PapersError::RateLimited(secs));
        }

        if !status.is_success() {
            return Err(PapersError::Api {
                code: status.as_u16() as i32,
                message: format!("E-utilities error: {}", status),
            });
        }

        Ok(response.text().await?)
    }

    /// Space request starts by `min_interval`
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// One page of esearch results
#[derive(Debug, Default)]
struct ESearchPage {
    count: Option<usize>,
    ids: Vec<String>,
}

// === esearch Response Types ===

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

fn parse_esearch(body: &str) -> Result<ESearchPage> {
    let data: ESearchResponse =
        serde_json::from_str(body).map_err(|e| PapersError::MalformedResponse {
            id: "esearch".to_string(),
            message: e.to_string(),
        })?;

    let result = data.esearchresult;
    if let Some(error) = result.error {
        return Err(PapersError::Api {
            code: 200,
            message: format!("esearch error: {}", error),
        });
    }

    Ok(ESearchPage {
        count: result.count.and_then(|c| c.trim().parse().ok()),
        ids: result.idlist,
    })
}
