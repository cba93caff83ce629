//! Multi-page retrieval for GitHub list and search endpoints.

use anyhow::{bail, Result};
use std::future::Future;

use crate::github::{ApiResult, Page};
use crate::rate_limit::RateLimiter;

/// Fetch every page starting at page 1 and return all items in order.
///
/// After each response the quota descriptor is passed through
/// [`RateLimiter::check`]. Iteration ends when a page reports no
/// `next_page`. The first failing page aborts the whole listing; items
/// gathered so far are dropped rather than returned partially.
///
/// `max_pages` guards against a provider that keeps advertising pages.
pub async fn paginate<T, F, Fut>(limiter: &RateLimiter, max_pages: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;
    let mut fetched = 0u32;

    loop {
        let resp = fetch(page).await?;
        fetched += 1;
        limiter.check(&resp.rate).await;
        items.extend(resp.items);

        match resp.next_page {
            None => break,
            Some(next) if fetched >= max_pages => {
                bail!("pagination stopped after {} pages (next page {})", fetched, next)
            }
            Some(next) if next <= page => {
                bail!("provider returned non-advancing page cursor {} after {}", next, page)
            }
            Some(next) => page = next,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{ApiError, RateInfo};
    use std::time::Duration;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Duration::ZERO, 0)
    }

    fn page(items: Vec<u32>, next_page: Option<u32>) -> Page<u32> {
        Page {
            items,
            rate: RateInfo::default(),
            next_page,
            total_count: None,
        }
    }

    #[tokio::test]
    async fn test_follows_next_page_until_none() {
        let mut requested = Vec::new();
        let items = paginate(&limiter(), 10, |p| {
            requested.push(p);
            async move {
                Ok(match p {
                    1 => page(vec![1, 2], Some(2)),
                    2 => page(vec![3], Some(3)),
                    _ => page(vec![4], None),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_single_empty_page() {
        let items: Vec<u32> = paginate(&limiter(), 10, |_| async { Ok(page(vec![], None)) })
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_page_error_discards_partial_results() {
        let result = paginate(&limiter(), 10, |p| async move {
            if p == 1 {
                Ok(page(vec![1, 2], Some(2)))
            } else {
                Err(ApiError::Status {
                    status: 500,
                    body: "boom".to_string(),
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_max_pages_bound() {
        let result = paginate(&limiter(), 3, |p| async move { Ok(page(vec![p], Some(p + 1))) }).await;
        assert!(result.unwrap_err().to_string().contains("after 3 pages"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_pauses_before_next_page() {
        let reset_at = chrono::Utc::now() + chrono::Duration::seconds(120);
        let started = tokio::time::Instant::now();
        let mut fetched_at = Vec::new();

        let items = paginate(&limiter(), 10, |p| {
            fetched_at.push(started.elapsed());
            async move {
                let mut resp = page(vec![p], if p == 1 { Some(2) } else { None });
                if p == 1 {
                    resp.rate = RateInfo {
                        limit: Some(5000),
                        remaining: Some(0),
                        reset_at: Some(reset_at),
                    };
                }
                Ok(resp)
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2]);
        assert_eq!(fetched_at[0], Duration::ZERO);
        assert!(fetched_at[1] >= Duration::from_secs(119), "waited {:?}", fetched_at[1]);
    }

    #[tokio::test]
    async fn test_non_advancing_cursor_is_an_error() {
        let result = paginate(&limiter(), 10, |_| async { Ok(page(vec![1], Some(1))) }).await;
        assert!(result.is_err());
    }
}
