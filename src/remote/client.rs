//! HTTP client that waits out rate limits and retries transient failures

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::error::ApiError;
use super::rate_limit::{RateLimitStatus, RateLimiter};
use crate::core::config::{RetrySettings, HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::core::CancelSignal;

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// JSON error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    documentation_url: Option<String>,
}

pub struct RetryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    limiter: RateLimiter,
    max_retries: u32,
}

impl RetryClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        retry: &RetrySettings,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_JSON));
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            limiter: RateLimiter::from_settings(retry),
            max_retries: retry.max_retries,
        })
    }

    pub fn rate_limit(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn send(&self, url: &str) -> Result<Response, reqwest::Error> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }

    /// GETs `path` and decodes the JSON body
    ///
    /// Every attempt first waits on the rate limiter. Retryable failures back
    /// off and try again up to `max_retries` times; other failures return at
    /// once.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancelSignal,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.wait(cancel).await?;

            let sent = tokio::select! {
                sent = self.send(&url) => sent,
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            };

            let (last, last_status, retry_after) = match sent {
                Ok(response) => {
                    self.limiter.update(response.headers());
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(ApiError::from);
                    }
                    if !RateLimiter::should_retry(status, response.headers()) {
                        return Err(remote_error(response).await);
                    }
                    (
                        format!("HTTP {status}"),
                        Some(status.as_u16()),
                        RateLimiter::retry_after(response.headers()),
                    )
                }
                Err(err) => match ApiError::from(err) {
                    ApiError::Transient { message, .. } => (message, None, None),
                    other => return Err(other),
                },
            };

            if attempt >= self.max_retries {
                return Err(ApiError::RetriesExhausted {
                    attempts: attempt + 1,
                    attempts_left: 0,
                    last_status,
                    last,
                });
            }

            let delay = self.limiter.backoff_with_retry_after(attempt, retry_after);
            tracing::warn!(
                "{url}: {last}, retrying in {:.1}s ({} attempts left)",
                delay.as_secs_f64(),
                self.max_retries - attempt
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            }
            attempt += 1;
        }
    }
}

/// Builds the error for a non-retryable response
async fn remote_error(response: Response) -> ApiError {
    let status = response.status();
    let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => ApiError::Remote {
            status: status.as_u16(),
            message: body.message,
            documentation_url: body.documentation_url,
        },
        Err(_) => ApiError::Remote {
            status: status.as_u16(),
            message: fallback,
            documentation_url: None,
        },
    }
}
