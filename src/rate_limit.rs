//! Quota-aware pacing for GitHub calls.
//!
//! GitHub reports the remaining quota and its reset time on every response.
//! [`RateLimiter::check`] is applied after each response: when no calls are
//! left it parks the calling task until the quota window resets (plus a small
//! margin). Nothing is retried here; a failed request is the caller's problem.
//!
//! Requests that were *rejected* for quota (403/429) are handled by
//! [`RateLimiter::with_quota_retry`], a bounded loop that waits for the reset
//! and tries again a limited number of times.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::github::{ApiError, ApiResult, RateInfo};

/// Wait used when the provider reports zero quota but no reset time.
const UNKNOWN_RESET_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    margin: Duration,
    max_quota_retries: u32,
}

impl RateLimiter {
    pub fn new(margin: Duration, max_quota_retries: u32) -> Self {
        Self {
            margin,
            max_quota_retries,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            Duration::from_secs(config.quota_margin_secs),
            config.max_quota_retries,
        )
    }

    /// How long the caller must pause after seeing `rate`, if at all.
    pub fn pause_for(&self, rate: &RateInfo, now: DateTime<Utc>) -> Option<Duration> {
        if !rate.is_exhausted() {
            return None;
        }
        Some(match rate.reset_at {
            Some(reset_at) => self.until(reset_at, now),
            None => UNKNOWN_RESET_WAIT,
        })
    }

    fn until(&self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (reset_at - now).to_std().unwrap_or(Duration::ZERO) + self.margin
    }

    /// Block the current task until quota is available again.
    pub async fn check(&self, rate: &RateInfo) {
        if let Some(delay) = self.pause_for(rate, Utc::now()) {
            tracing::info!(
                limit = ?rate.limit,
                wait_secs = delay.as_secs(),
                "GitHub quota exhausted, waiting for reset"
            );
            tokio::time::sleep(delay).await;
        } else if let Some(remaining) = rate.remaining {
            tracing::trace!(remaining, "quota remaining");
        }
    }

    /// Run `op`, waiting out quota rejections up to the configured retry cap.
    ///
    /// Only [`ApiError::QuotaExhausted`] is retried; every other error is
    /// returned as-is on the first occurrence.
    pub async fn with_quota_retry<T, F, Fut>(&self, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            match op().await {
                Err(ApiError::QuotaExhausted { reset_at }) if retries < self.max_quota_retries => {
                    retries += 1;
                    let delay = self.until(reset_at, Utc::now());
                    tracing::warn!(
                        attempt = retries,
                        wait_secs = delay.as_secs(),
                        "request rejected for quota, retrying after reset"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
