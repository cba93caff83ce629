//! Per-account synchronization: profile upsert, then repository upsert and
//! staleness pruning.
//!
//! Every write of a pass carries the pass stamp as `refreshed_at`. After an
//! account's repository listing has been fully written, any of its
//! repositories still carrying an older stamp no longer exist upstream and are
//! deleted. A listing that fails part-way aborts before that prune, so a
//! transient error never removes data.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::convert::{profile_to_account, record_to_repository};
use crate::github::{GitHubApi, Lookup};
use crate::paginate::paginate;
use crate::rate_limit::RateLimiter;
use crate::store;

/// Result of [`Syncer::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Profile fetched and written.
    Upserted,
    /// The account no longer exists upstream and was deleted locally.
    Removed,
}

/// Counters from [`Syncer::sync_repos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepoSync {
    pub upserted: u64,
    pub pruned: u64,
    pub skipped: u64,
}

/// Cheap to clone; every worker of a pass owns one.
#[derive(Clone)]
pub struct Syncer {
    api: Arc<dyn GitHubApi>,
    pool: SqlitePool,
    limiter: RateLimiter,
    max_pages: u32,
}

impl Syncer {
    pub fn new(api: Arc<dyn GitHubApi>, pool: SqlitePool, limiter: RateLimiter, max_pages: u32) -> Self {
        Self {
            api,
            pool,
            limiter,
            max_pages,
        }
    }

    /// Fetch `login`'s profile and upsert it, or delete the account if it is gone.
    ///
    /// Fetch errors return before anything is written.
    pub async fn add(&self, login: &str, refreshed_at: DateTime<Utc>) -> Result<AddOutcome> {
        let (lookup, rate) = self
            .limiter
            .with_quota_retry(|| self.api.get_profile(login))
            .await
            .with_context(|| format!("failed to fetch profile for {}", login))?;
        self.limiter.check(&rate).await;

        let profile = match lookup {
            Lookup::Found(profile) => profile,
            Lookup::Gone => {
                let existed = store::delete_account(&self.pool, login).await?;
                tracing::info!(login, existed, "account gone upstream, removed");
                return Ok(AddOutcome::Removed);
            }
        };

        let mut account = profile_to_account(profile, refreshed_at)
            .with_context(|| format!("invalid profile for {}", login))?;
        if !account.login.eq_ignore_ascii_case(login) {
            bail!("profile for {} reports login {}", login, account.login);
        }
        // Identity stays the discovered login, whatever casing the profile uses.
        account.login = login.to_string();

        store::upsert_account(&self.pool, &account).await?;
        tracing::debug!(login, kind = %account.kind, "account upserted");
        Ok(AddOutcome::Upserted)
    }

    /// Mirror every repository `login` owns and prune the ones not seen.
    pub async fn sync_repos(&self, login: &str, refreshed_at: DateTime<Utc>) -> Result<RepoSync> {
        let records = paginate(&self.limiter, self.max_pages, |page| {
            self.limiter
                .with_quota_retry(move || self.api.list_repositories(login, page))
        })
        .await
        .with_context(|| format!("failed to list repositories for {}", login))?;

        let mut stats = RepoSync::default();
        for record in records {
            match record_to_repository(record, login, refreshed_at) {
                Some(repo) => {
                    store::upsert_repository(&self.pool, &repo).await?;
                    stats.upserted += 1;
                }
                None => {
                    tracing::warn!(login, "skipping repository without a name");
                    stats.skipped += 1;
                }
            }
        }

        stats.pruned = store::prune_stale_repositories(&self.pool, login, refreshed_at).await?;
        tracing::debug!(
            login,
            upserted = stats.upserted,
            pruned = stats.pruned,
            skipped = stats.skipped,
            "repositories synced"
        );
        Ok(stats)
    }
}
