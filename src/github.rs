//! GitHub REST API boundary.
//!
//! The engine talks to the provider only through the [`GitHubApi`] trait so
//! that tests (and alternative transports) can stand in for the network.
//! [`GitHubClient`] is the production implementation on top of `reqwest`.
//!
//! Every call returns the quota descriptor ([`RateInfo`]) parsed from the
//! `X-RateLimit-*` response headers, which the [`RateLimiter`] consumes.
//!
//! # Errors
//!
//! | Condition | Result |
//! |-----------|--------|
//! | 404 / 410 on a profile lookup | `Ok(Lookup::Gone)` (not an error) |
//! | 403 / 429 with no quota left, or `Retry-After` | [`ApiError::QuotaExhausted`] |
//! | any other non-2xx | [`ApiError::Status`] |
//! | transport failure | [`ApiError::Network`] |
//! | malformed body | [`ApiError::Decode`] |
//!
//! [`RateLimiter`]: crate::rate_limit::RateLimiter

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::GitHubConfig;
use crate::models::{Profile, RepoRecord};

/// Page size requested from every list and search endpoint.
pub const PER_PAGE: u32 = 100;

/// Errors that can occur when calling the GitHub API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("GitHub quota exhausted, resets at {reset_at}")]
    QuotaExhausted { reset_at: DateTime<Utc> },

    #[error("GitHub API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GitHub request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid GitHub response: {0}")]
    Decode(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Quota descriptor returned alongside every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateInfo {
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateInfo {
    /// Parse `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let int = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };

        Self {
            limit: int("x-ratelimit-limit"),
            remaining: int("x-ratelimit-remaining"),
            reset_at: int("x-ratelimit-reset").and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.remaining, Some(r) if r <= 0)
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub rate: RateInfo,
    /// `None` once the provider reports no further pages.
    pub next_page: Option<u32>,
    /// Total matches reported by search endpoints.
    pub total_count: Option<u64>,
}

/// Outcome of a lookup where absence upstream is an expected answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// The account was deleted or is no longer public.
    Gone,
}

/// The three provider calls the engine depends on.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// One page of `GET /search/users?q=<query>`; items are logins.
    async fn search_accounts(&self, query: &str, page: u32) -> ApiResult<Page<String>>;

    /// `GET /users/{login}`.
    async fn get_profile(&self, login: &str) -> ApiResult<(Lookup<Profile>, RateInfo)>;

    /// One page of `GET /users/{login}/repos` (owned repositories only).
    async fn list_repositories(&self, login: &str, page: u32) -> ApiResult<Page<RepoRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════
// reqwest implementation
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    login: Option<String>,
}

/// GitHub REST v3 client.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let token = config.token();
        if token.is_none() {
            tracing::warn!(
                env = %config.token_env,
                "no GitHub token configured, using the unauthenticated quota"
            );
        }

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Send a GET and classify quota rejections. Other statuses are returned
    /// untouched so callers can decide what a 404 means.
    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<(reqwest::Response, RateInfo)> {
        let mut req = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(query);

        if let Some(ref token) = self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req.send().await?;
        let rate = RateInfo::from_headers(resp.headers());
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(reset_at) = quota_rejection(resp.status(), &rate, retry_after, Utc::now()) {
            return Err(ApiError::QuotaExhausted { reset_at });
        }

        Ok((resp, rate))
    }
}

async fn error_for_status(resp: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> ApiResult<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn search_accounts(&self, query: &str, page: u32) -> ApiResult<Page<String>> {
        let (resp, rate) = self
            .get(
                "/search/users",
                &[
                    ("q", query.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        let next_page = next_page_from_headers(resp.headers());
        let body: SearchResponse = decode(error_for_status(resp).await?).await?;

        if body.incomplete_results {
            tracing::warn!(query, page, "search returned incomplete results");
        }

        Ok(Page {
            items: body.items.into_iter().filter_map(|i| i.login).collect(),
            rate,
            next_page,
            total_count: Some(body.total_count),
        })
    }

    async fn get_profile(&self, login: &str) -> ApiResult<(Lookup<Profile>, RateInfo)> {
        let (resp, rate) = self.get(&format!("/users/{}", login), &[]).await?;

        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok((Lookup::Gone, rate));
        }

        let profile: Profile = decode(error_for_status(resp).await?).await?;
        Ok((Lookup::Found(profile), rate))
    }

    async fn list_repositories(&self, login: &str, page: u32) -> ApiResult<Page<RepoRecord>> {
        let (resp, rate) = self
            .get(
                &format!("/users/{}/repos", login),
                &[
                    ("type", "owner".to_string()),
                    ("sort", "updated".to_string()),
                    ("direction", "desc".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        let next_page = next_page_from_headers(resp.headers());
        let items: Vec<RepoRecord> = decode(error_for_status(resp).await?).await?;

        Ok(Page {
            items,
            rate,
            next_page,
            total_count: None,
        })
    }
}

// ============ Header helpers ============

/// Decide whether a response is a quota rejection, returning when to retry.
///
/// Primary limits answer 403/429 with `X-RateLimit-Remaining: 0`; secondary
/// limits answer with a `Retry-After` delay in seconds.
fn quota_rejection(
    status: StatusCode,
    rate: &RateInfo,
    retry_after_secs: Option<u64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    if let Some(secs) = retry_after_secs {
        return Some(now + chrono::Duration::seconds(secs as i64));
    }
    if rate.is_exhausted() {
        return Some(rate.reset_at.unwrap_or(now));
    }
    None
}

fn next_page_from_headers(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_next_page)
}

/// Extract the `page` parameter of the `rel="next"` target in a `Link` header.
pub fn parse_next_page(link: &str) -> Option<u32> {
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| {
            let s = s.trim();
            s == r#"rel="next""# || s == "rel=next"
        });
        if !is_next {
            return None;
        }
        let url = target.trim_start_matches('<').trim_end_matches('>');
        let query = url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key == "page" {
                value.parse::<u32>().ok()
            } else {
                None
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_next_page() {
        let link = r#"<https://api.github.com/search/users?q=location%3ASTL&per_page=100&page=2>; rel="next", <https://api.github.com/search/users?q=location%3ASTL&per_page=100&page=10>; rel="last""#;
        assert_eq!(parse_next_page(link), Some(2));
    }

    #[test]
    fn test_parse_next_page_absent_on_last_page() {
        let link = r#"<https://api.github.com/user/9/repos?page=1>; rel="prev", <https://api.github.com/user/9/repos?page=1>; rel="first""#;
        assert_eq!(parse_next_page(link), None);
    }

    #[test]
    fn test_parse_next_page_ignores_other_params() {
        let link = r#"<https://api.github.com/users/bob/repos?per_page=100&type=owner&page=7>; rel="next""#;
        assert_eq!(parse_next_page(link), Some(7));
    }

    #[test]
    fn test_rate_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));

        let rate = RateInfo::from_headers(&headers);
        assert_eq!(rate.limit, Some(5000));
        assert_eq!(rate.remaining, Some(0));
        assert_eq!(rate.reset_at, DateTime::from_timestamp(1_700_000_000, 0));
        assert!(rate.is_exhausted());
    }

    #[test]
    fn test_rate_info_missing_headers() {
        let rate = RateInfo::from_headers(&HeaderMap::new());
        assert_eq!(rate, RateInfo::default());
        assert!(!rate.is_exhausted());
    }

    #[test]
    fn test_quota_rejection_classification() {
        let now = Utc::now();
        let reset = now + chrono::Duration::seconds(90);
        let exhausted = RateInfo {
            limit: Some(30),
            remaining: Some(0),
            reset_at: Some(reset),
        };
        let healthy = RateInfo {
            remaining: Some(12),
            ..exhausted
        };

        assert_eq!(
            quota_rejection(StatusCode::FORBIDDEN, &exhausted, None, now),
            Some(reset)
        );
        assert_eq!(
            quota_rejection(StatusCode::TOO_MANY_REQUESTS, &healthy, Some(60), now),
            Some(now + chrono::Duration::seconds(60))
        );
        // A plain 403 (e.g. a blocked account) is not a quota problem.
        assert_eq!(quota_rejection(StatusCode::FORBIDDEN, &healthy, None, now), None);
        assert_eq!(quota_rejection(StatusCode::OK, &exhausted, None, now), None);
    }
}
