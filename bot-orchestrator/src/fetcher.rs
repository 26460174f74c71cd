use crate::types::{FetchConfig, OrchestratorError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Outcome of fetching one feed URL. `body` is `None` when the server
/// answered 304 Not Modified against the supplied conditional headers.
#[derive(Debug)]
pub struct FetchOutcome {
    pub body: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    last_request: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let redirect_policy = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect_policy)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Fetch one feed URL with retries. Conditional headers are passed
    /// through so unchanged feeds cost a 304 instead of a full body.
    pub async fn fetch_feed(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome> {
        debug!("Fetching feed: {}", url);

        self.apply_host_delay(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error: Option<OrchestratorError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.request_with_conditional_headers(url, etag, last_modified).await {
                Ok(response) => {
                    let status = response.status();

                    if status == reqwest::StatusCode::NOT_MODIFIED {
                        debug!("Feed not modified: {}", url);
                        return Ok(FetchOutcome {
                            body: None,
                            etag: etag.map(|s| s.to_string()),
                            last_modified: last_modified.map(|s| s.to_string()),
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(OrchestratorError::Fetch(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));
                        if attempt < self.config.max_retries {
                            if let Some(delay) = backoff.next_backoff() {
                                warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                        }
                        break;
                    }

                    let new_etag = header_value(&response, "etag");
                    let new_last_modified = header_value(&response, "last-modified");

                    if let Some(content_length) = response.content_length() {
                        let size_mb = content_length as usize / (1024 * 1024);
                        if size_mb > self.config.max_feed_size_mb {
                            return Err(OrchestratorError::Fetch(format!(
                                "feed too large: {}MB (limit {}MB)",
                                size_mb, self.config.max_feed_size_mb
                            )));
                        }
                    }

                    match response.text().await {
                        Ok(body) => {
                            debug!("Fetched feed {} ({} bytes)", url, body.len());
                            return Ok(FetchOutcome {
                                body: Some(body),
                                etag: new_etag,
                                last_modified: new_last_modified,
                            });
                        }
                        Err(e) => {
                            last_error = Some(OrchestratorError::Http(e));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| OrchestratorError::Fetch(format!("exhausted retries for {}", url))))
    }

    async fn request_with_conditional_headers(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }

        let response = request.send().await?;
        Ok(response)
    }

    /// Politeness delay: at most one request per host per configured
    /// interval.
    async fn apply_host_delay(&self, url: &str) -> Result<()> {
        if self.config.per_host_delay_ms == 0 {
            return Ok(());
        }
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.per_host_delay_ms);

        let now = Instant::now();
        {
            let mut last_request = self.last_request.write().await;
            if let Some(previous) = last_request.get(&host) {
                let elapsed = now.duration_since(*previous);
                if elapsed < min_interval {
                    let wait = min_interval - elapsed;
                    debug!("Host delay for {}: waiting {:?}", host, wait);
                    tokio::time::sleep(wait).await;
                }
            }
            last_request.insert(host, Instant::now());
        }

        Ok(())
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
