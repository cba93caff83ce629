//! Membership discovery via GitHub user search.
//!
//! The search API returns at most `result_cap` (1000) results per query, far
//! fewer than a large city has accounts. Discovery therefore slices the search
//! by account creation date into non-overlapping windows, runs one paginated
//! search per window, and unions the logins.
//!
//! # Partitioning
//!
//! The initial windows are `partition_months` wide, from
//! `discovery.earliest` through today. The first page of every window
//! reports the total match count; a window whose total exceeds the cap is
//! bisected and both halves are searched instead. Bisection stops at a single
//! day. A one-day window that still exceeds the cap is searched anyway and a
//! warning is logged: those accounts beyond the cap are missed this pass.
//!
//! ```text
//! created:2008-01-01..2008-12-31   (total 340)  → searched
//! created:2009-01-01..2009-12-31   (total 1450) → split
//!   created:2009-01-01..2009-07-02 (total 700)  → searched
//!   created:2009-07-03..2009-12-31 (total 750)  → searched
//! ```

use anyhow::{Context, Result};
use chrono::{Days, Months, NaiveDate, Utc};
use std::collections::BTreeSet;

use crate::config::DiscoveryConfig;
use crate::github::{ApiResult, GitHubApi, Page};
use crate::models::AccountKind;
use crate::paginate::paginate;
use crate::rate_limit::RateLimiter;

/// An inclusive range of account-creation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// The `created:` search qualifier for this window.
    pub fn qualifier(&self) -> String {
        format!(
            "created:{}..{}",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }

    /// Split into two adjacent, non-overlapping halves. `None` for a single day.
    pub fn split(&self) -> Option<(DateWindow, DateWindow)> {
        let span = (self.to - self.from).num_days();
        if span < 1 {
            return None;
        }
        let mid = self.from.checked_add_days(Days::new((span / 2) as u64))?;
        let after_mid = mid.succ_opt()?;
        Some((
            DateWindow::new(self.from, mid),
            DateWindow::new(after_mid, self.to),
        ))
    }
}

/// Cover `earliest..=today` with consecutive windows `months` wide.
pub fn initial_windows(earliest: NaiveDate, today: NaiveDate, months: u32) -> Vec<DateWindow> {
    let mut windows = Vec::new();
    let mut from = earliest;

    while from <= today {
        let next = match from.checked_add_months(Months::new(months.max(1))) {
            Some(next) => next,
            None => {
                windows.push(DateWindow::new(from, today));
                break;
            }
        };
        let to = next.pred_opt().unwrap_or(next).min(today);
        windows.push(DateWindow::new(from, to));
        from = next;
    }

    windows
}

/// Build the search query for one kind and one creation window.
pub fn build_query(
    locations: &[String],
    window: &DateWindow,
    min_repos: u32,
    kind: AccountKind,
) -> String {
    let mut parts: Vec<String> = locations
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| format!("location:\"{}\"", l))
        .collect();
    parts.push(window.qualifier());
    if min_repos > 0 {
        parts.push(format!("repos:>={}", min_repos));
    }
    parts.push(format!("type:{}", kind.search_qualifier()));
    parts.join(" ")
}

/// Runs the partitioned membership search.
pub struct Discovery<'a> {
    api: &'a dyn GitHubApi,
    limiter: &'a RateLimiter,
    config: &'a DiscoveryConfig,
}

impl<'a> Discovery<'a> {
    pub fn new(api: &'a dyn GitHubApi, limiter: &'a RateLimiter, config: &'a DiscoveryConfig) -> Self {
        Self {
            api,
            limiter,
            config,
        }
    }

    /// Full membership: individuals and organizations, deduplicated.
    pub async fn discover_all(&self) -> Result<BTreeSet<String>> {
        let mut members = BTreeSet::new();
        for kind in AccountKind::ALL {
            members.extend(self.discover(kind).await?);
        }
        tracing::info!(total = members.len(), "discovery complete");
        Ok(members)
    }

    /// All logins of `kind` matching the configured locations.
    pub async fn discover(&self, kind: AccountKind) -> Result<BTreeSet<String>> {
        self.discover_through(kind, Utc::now().date_naive()).await
    }

    /// Like [`discover`](Self::discover) with an explicit upper creation date.
    pub async fn discover_through(&self, kind: AccountKind, today: NaiveDate) -> Result<BTreeSet<String>> {
        let mut logins = BTreeSet::new();

        // Stack of windows still to search; popped in chronological order.
        let mut pending = initial_windows(
            self.config.earliest,
            today,
            self.config.partition_months,
        );
        pending.reverse();

        let mut searched = 0usize;
        while let Some(window) = pending.pop() {
            let query = build_query(&self.config.locations, &window, self.config.min_repos, kind);
            let first = self
                .search_page(&query, 1)
                .await
                .with_context(|| format!("search failed for {}", window.qualifier()))?;
            let total = first.total_count.unwrap_or(0);

            if total > self.config.result_cap {
                if let Some((early, late)) = window.split() {
                    tracing::debug!(
                        %kind,
                        window = %window.qualifier(),
                        total,
                        "partition exceeds result cap, splitting"
                    );
                    // The dropped first page still carries quota state.
                    self.limiter.check(&first.rate).await;
                    pending.push(late);
                    pending.push(early);
                    continue;
                }
                tracing::warn!(
                    %kind,
                    window = %window.qualifier(),
                    total,
                    cap = self.config.result_cap,
                    "single-day partition exceeds the search result cap, some accounts will be missed"
                );
            }

            let found = self
                .collect_window(&query, first)
                .await
                .with_context(|| format!("search failed for {}", window.qualifier()))?;
            searched += 1;
            tracing::debug!(%kind, window = %window.qualifier(), total, found = found.len(), "partition searched");

            logins.extend(
                found
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty()),
            );
        }

        tracing::info!(%kind, partitions = searched, found = logins.len(), "discovered accounts");
        Ok(logins)
    }

    /// Page through one window, reusing the already fetched first page.
    async fn collect_window(&self, query: &str, first: Page<String>) -> Result<Vec<String>> {
        let mut first = Some(first);
        paginate(self.limiter, self.config.max_pages, |page| {
            let cached = if page == 1 { first.take() } else { None };
            async move {
                match cached {
                    Some(p) => Ok(p),
                    None => self.search_page(query, page).await,
                }
            }
        })
        .await
    }

    async fn search_page(&self, query: &str, page: u32) -> ApiResult<Page<String>> {
        self.limiter
            .with_quota_retry(|| async {
                tokio::time::sleep(self.config.query_delay()).await;
                self.api.search_accounts(query, page).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_initial_windows_cover_range_without_overlap() {
        let windows = initial_windows(date(2013, 1, 1), date(2015, 6, 15), 12);
        assert_eq!(
            windows,
            vec![
                DateWindow::new(date(2013, 1, 1), date(2013, 12, 31)),
                DateWindow::new(date(2014, 1, 1), date(2014, 12, 31)),
                DateWindow::new(date(2015, 1, 1), date(2015, 6, 15)),
            ]
        );
        for pair in windows.windows(2) {
            assert_eq!(pair[0].to.succ_opt().unwrap(), pair[1].from);
        }
    }

    #[test]
    fn test_initial_windows_empty_when_earliest_in_future() {
        assert!(initial_windows(date(2030, 1, 1), date(2025, 1, 1), 12).is_empty());
    }

    #[test]
    fn test_split_halves_are_adjacent() {
        let window = DateWindow::new(date(2020, 1, 1), date(2020, 12, 31));
        let (a, b) = window.split().unwrap();
        assert_eq!(a.from, window.from);
        assert_eq!(b.to, window.to);
        assert_eq!(a.to.succ_opt().unwrap(), b.from);
    }

    #[test]
    fn test_split_two_days() {
        let window = DateWindow::new(date(2020, 3, 1), date(2020, 3, 2));
        let (a, b) = window.split().unwrap();
        assert_eq!(a, DateWindow::new(date(2020, 3, 1), date(2020, 3, 1)));
        assert_eq!(b, DateWindow::new(date(2020, 3, 2), date(2020, 3, 2)));
    }

    #[test]
    fn test_single_day_does_not_split() {
        let day = DateWindow::new(date(2020, 3, 1), date(2020, 3, 1));
        assert!(day.split().is_none());
    }

    #[test]
    fn test_build_query() {
        let locations = vec!["St. Louis".to_string(), " STL ".to_string(), "".to_string()];
        let window = DateWindow::new(date(2014, 1, 1), date(2014, 12, 31));
        assert_eq!(
            build_query(&locations, &window, 1, AccountKind::Organization),
            r#"location:"St. Louis" location:"STL" created:2014-01-01..2014-12-31 repos:>=1 type:org"#
        );
        assert_eq!(
            build_query(&locations, &window, 0, AccountKind::Individual),
            r#"location:"St. Louis" location:"STL" created:2014-01-01..2014-12-31 type:user"#
        );
    }
}
