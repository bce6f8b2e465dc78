//! Rate-limit window tracking and backoff
//!
//! The window is refreshed from the `X-RateLimit-*` headers of every response
//! and consulted before every request.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::Mutex;
use std::time::Duration;

use super::error::ApiError;
use crate::core::config::RetrySettings;
use crate::core::CancelSignal;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

// Assumed window until the first response reports the real one
const INITIAL_LIMIT: u64 = 5_000;
const DEFAULT_WINDOW_SECS: i64 = 3_600;

/// Remaining quota and reset time of the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests left in this window, never below zero
    pub remaining: u64,
    pub limit: u64,
    pub reset: DateTime<Utc>,
}

impl Default for RateLimitStatus {
    fn default() -> Self {
        Self {
            remaining: INITIAL_LIMIT,
            limit: INITIAL_LIMIT,
            reset: Utc::now() + chrono::Duration::seconds(DEFAULT_WINDOW_SECS),
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    status: Mutex<RateLimitStatus>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            status: Mutex::new(RateLimitStatus::default()),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.base_delay(), settings.max_delay())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimitStatus> {
        // The guarded value is plain data, so a poisoned lock is still usable
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> RateLimitStatus {
        *self.lock()
    }

    pub fn set_status(&self, status: RateLimitStatus) {
        *self.lock() = status;
    }

    /// Waits until a request may be sent
    ///
    /// Returns immediately when quota remains. With the quota exhausted it
    /// sleeps until the reset time, returning [`ApiError::Cancelled`] as soon
    /// as `cancel` fires.
    pub async fn wait(&self, cancel: &CancelSignal) -> Result<(), ApiError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let delay = {
                let mut status = self.lock();
                let now = Utc::now();
                if status.remaining > 0 {
                    status.remaining -= 1;
                    return Ok(());
                }
                if now >= status.reset {
                    status.remaining = status.limit.max(1) - 1;
                    status.reset = now + chrono::Duration::seconds(DEFAULT_WINDOW_SECS);
                    return Ok(());
                }
                (status.reset - now).to_std().unwrap_or(Duration::ZERO)
            };

            tracing::info!(
                "Rate limit exhausted, waiting {:.1}s for the window to reset",
                delay.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            }
        }
    }

    /// Refreshes the window from response headers; absent headers leave the
    /// corresponding field unchanged
    pub fn update(&self, headers: &HeaderMap) {
        let remaining = header_i64(headers, HEADER_REMAINING);
        let limit = header_i64(headers, HEADER_LIMIT);
        let reset = header_i64(headers, HEADER_RESET)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        let mut status = self.lock();
        if let Some(remaining) = remaining {
            status.remaining = remaining.max(0) as u64;
        }
        if let Some(limit) = limit {
            status.limit = limit.max(0) as u64;
        }
        if let Some(reset) = reset {
            status.reset = reset;
        }
        tracing::trace!(
            remaining = status.remaining,
            limit = status.limit,
            reset = %status.reset,
            "rate limit window updated"
        );
    }

    /// Whether a non-success response is worth retrying
    ///
    /// 429 and 5xx are retryable. A 403 that reports an empty quota is a
    /// secondary rate limit and retryable as well; any other 4xx is final.
    pub fn should_retry(status: StatusCode, headers: &HeaderMap) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return true;
        }
        status == StatusCode::FORBIDDEN && header_i64(headers, HEADER_REMAINING) == Some(0)
    }

    /// `base * 2^attempt`, capped at the configured maximum
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff widened to a server-provided Retry-After when that is longer
    pub fn backoff_with_retry_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff(attempt);
        match retry_after {
            Some(server) if server > delay => server,
            _ => delay,
        }
    }

    /// Parses `Retry-After` given in seconds
    pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        header_i64(headers, HEADER_RETRY_AFTER).map(|secs| Duration::from_secs(secs.max(0) as u64))
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel_pair;
    use reqwest::header::HeaderValue;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Duration::from_millis(100), Duration::from_secs(1))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_backoff_strictly_increases_until_cap() {
        let limiter = limiter();
        assert!(limiter.backoff(0) < limiter.backoff(1));
        assert!(limiter.backoff(1) < limiter.backoff(2));
        assert_eq!(limiter.backoff(0), Duration::from_millis(100));
        assert_eq!(limiter.backoff(3), Duration::from_millis(800));
        assert_eq!(limiter.backoff(4), Duration::from_secs(1));
        assert_eq!(limiter.backoff(63), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_after_widens_backoff() {
        let limiter = limiter();
        assert_eq!(
            limiter.backoff_with_retry_after(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            limiter.backoff_with_retry_after(2, Some(Duration::from_millis(10))),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_should_retry_classification() {
        let empty = HeaderMap::new();
        assert!(RateLimiter::should_retry(StatusCode::TOO_MANY_REQUESTS, &empty));
        assert!(RateLimiter::should_retry(StatusCode::BAD_GATEWAY, &empty));
        assert!(!RateLimiter::should_retry(StatusCode::NOT_FOUND, &empty));
        assert!(!RateLimiter::should_retry(StatusCode::FORBIDDEN, &empty));
        assert!(RateLimiter::should_retry(
            StatusCode::FORBIDDEN,
            &headers(&[(HEADER_REMAINING, "0")])
        ));
    }

    #[test]
    fn test_update_clamps_negative_remaining() {
        let limiter = limiter();
        limiter.update(&headers(&[
            (HEADER_REMAINING, "-3"),
            (HEADER_LIMIT, "60"),
            (HEADER_RESET, "1700000000"),
        ]));
        let status = limiter.status();
        assert_eq!(status.remaining, 0);
        assert_eq!(status.limit, 60);
        assert_eq!(status.reset.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_update_ignores_garbage_headers() {
        let limiter = limiter();
        let before = limiter.status();
        limiter.update(&headers(&[(HEADER_REMAINING, "lots")]));
        assert_eq!(limiter.status(), before);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_reset() {
        let limiter = limiter();
        let reset = Utc::now() + chrono::Duration::milliseconds(300);
        limiter.set_status(RateLimitStatus {
            remaining: 0,
            limit: 10,
            reset,
        });

        limiter.wait(&CancelSignal::never()).await.unwrap();
        assert!(Utc::now() >= reset);
        assert_eq!(limiter.status().remaining, 9);
    }

    #[tokio::test]
    async fn test_wait_returns_when_cancelled() {
        let limiter = limiter();
        limiter.set_status(RateLimitStatus {
            remaining: 0,
            limit: 10,
            reset: Utc::now() + chrono::Duration::hours(1),
        });
        let (handle, cancel) = cancel_pair();
        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { limiter.wait(&cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should return promptly")
            .unwrap();
        assert_eq!(result, Err(ApiError::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_with_quota_is_immediate() {
        let limiter = limiter();
        let before = limiter.status().remaining;
        limiter.wait(&CancelSignal::never()).await.unwrap();
        assert_eq!(limiter.status().remaining, before - 1);
    }
}
