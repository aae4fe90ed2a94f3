use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use railhub_core::SourceId;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_USER_AGENT: &str = "Railhub/1.0 (Industry Data Aggregator)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = u32::try_from(attempt_index)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Ceiling on a response body. An overrun fails the whole source.
    pub max_body_bytes: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: 16 * 1024 * 1024,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// One GET against an external resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("body of {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },
}

impl FetchError {
    /// The resource could not be reached at all, as opposed to answering badly.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    /// A well-formed answer was refused by the body ceiling.
    pub fn is_oversized(&self) -> bool {
        matches!(self, FetchError::BodyTooLarge { .. })
    }
}

/// Network boundary used by source adapters.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        source: SourceId,
        request: &PageRequest,
    ) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
            backoff: config.backoff,
        })
    }

    async fn fetch_with_retries(&self, request: &PageRequest) -> Result<FetchedPage, FetchError> {
        let transport = |err: reqwest::Error| FetchError::Transport {
            url: request.url.clone(),
            message: err.to_string(),
        };

        let mut attempt = 0;
        loop {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        if resp
                            .content_length()
                            .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > self.max_body_bytes))
                        {
                            return Err(FetchError::BodyTooLarge {
                                url: final_url,
                                limit: self.max_body_bytes,
                            });
                        }
                        let body = resp.text().await.map_err(transport)?;
                        if body.len() > self.max_body_bytes {
                            return Err(FetchError::BodyTooLarge {
                                url: final_url,
                                limit: self.max_body_bytes,
                            });
                        }
                        return Ok(FetchedPage {
                            status: status.as_u16(),
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(status = status.as_u16(), attempt, "retrying after status");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(error = %err, attempt, "retrying after transport error");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(transport(err));
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        source: SourceId,
        request: &PageRequest,
    ) -> Result<FetchedPage, FetchError> {
        let span = info_span!("http_fetch", source = source.slug(), url = %request.url);
        self.fetch_with_retries(request).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn only_server_errors_and_throttling_retry() {
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn page_request_accumulates_headers() {
        let req = PageRequest::get("https://example.test")
            .header("Accept", "text/html")
            .header("x-rapidapi-host", "jsearch.p.rapidapi.com");
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.headers[1].0, "x-rapidapi-host");
    }

    #[test]
    fn only_transport_failures_count_as_unreachable() {
        let down = FetchError::Transport {
            url: "u".into(),
            message: "connection refused".into(),
        };
        let gone = FetchError::HttpStatus {
            status: 404,
            url: "u".into(),
        };
        assert!(down.is_transport());
        assert!(!gone.is_transport());
    }

    /// Answers one request on a loopback port with a 200 and `body`.
    async fn serve_once(body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        });
        format!("http://{addr}/reqs")
    }

    fn large_json() -> String {
        let rows: Vec<String> = (0..12_000)
            .map(|i| format!(r#"{{"id":"{i}","title":"Conductor trainee, Waycross terminal"}}"#))
            .collect();
        format!("[{}]", rows.join(","))
    }

    #[tokio::test]
    async fn default_config_accepts_multi_hundred_kilobyte_pages() {
        let body = large_json();
        assert!(body.len() > 600_000);
        let url = serve_once(body.clone()).await;

        let fetcher = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let page = fetcher
            .fetch_page(SourceId::CsxCareers, &PageRequest::get(url))
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body.len(), body.len());
    }

    #[tokio::test]
    async fn body_over_the_ceiling_is_reported_as_oversized() {
        let url = serve_once(large_json()).await;
        let fetcher = HttpFetcher::new(HttpClientConfig {
            max_body_bytes: 100_000,
            ..HttpClientConfig::default()
        })
        .unwrap();

        let err = fetcher
            .fetch_page(SourceId::CsxCareers, &PageRequest::get(url))
            .await
            .unwrap_err();
        assert!(err.is_oversized());
        assert!(!err.is_transport());
    }
}
