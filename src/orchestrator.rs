//! Drives one synchronization pass end to end and schedules passes.
//!
//! # Pass sequence
//!
//! 1. Claim the running flag; a second caller gets `Ok(None)` immediately.
//! 2. Append a run record. Its stamp becomes `refreshed_at` for every write
//!    of this pass.
//! 3. Discover the membership (individuals and organizations).
//! 4. Reconcile: delete mirrored accounts that were not discovered.
//! 5. Fan the discovered logins out to a fixed pool of workers over a bounded
//!    queue. Each worker upserts the profile and, if the account still
//!    exists, its repositories.
//! 6. Wait for every worker, then release the flag.
//!
//! A discovery failure aborts the pass. Failures for a single account are
//! logged and counted in the [`RunReport`] and never abort the pass.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::config::{Config, DiscoveryConfig, SyncConfig};
use crate::discovery::Discovery;
use crate::github::GitHubApi;
use crate::pruner;
use crate::rate_limit::RateLimiter;
use crate::run_log;
use crate::syncer::{AddOutcome, Syncer};

/// Summary of one completed pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub discovered: usize,
    pub removed: usize,
    pub upserted: u64,
    pub gone: u64,
    pub failed: u64,
    pub repos_upserted: u64,
    pub repos_pruned: u64,
}

/// Per-worker counters, merged into the report after the barrier.
#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    upserted: u64,
    gone: u64,
    failed: u64,
    repos_upserted: u64,
    repos_pruned: u64,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.upserted += other.upserted;
        self.gone += other.gone;
        self.failed += other.failed;
        self.repos_upserted += other.repos_upserted;
        self.repos_pruned += other.repos_pruned;
    }
}

/// Clears the running flag when dropped, including on error or panic.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Whether a scheduled pass should start now.
pub fn is_due(last_run: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
    match last_run {
        None => true,
        Some(last) => now - last >= interval,
    }
}

pub struct Orchestrator {
    pool: SqlitePool,
    api: Arc<dyn GitHubApi>,
    limiter: RateLimiter,
    syncer: Syncer,
    discovery: DiscoveryConfig,
    sync: SyncConfig,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, api: Arc<dyn GitHubApi>, config: &Config) -> Self {
        let limiter = RateLimiter::from_config(&config.sync);
        let syncer = Syncer::new(
            Arc::clone(&api),
            pool.clone(),
            limiter.clone(),
            config.discovery.max_pages,
        );
        Self {
            pool,
            api,
            limiter,
            syncer,
            discovery: config.discovery.clone(),
            sync: config.sync.clone(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared view of the running flag, for readers that must not cache
    /// results taken mid-pass.
    pub fn pass_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub async fn last_run(&self) -> Result<Option<DateTime<Utc>>> {
        run_log::last_run(&self.pool).await
    }

    /// Start a pass in the background. Returns `false` if one was already
    /// running when called (the spawned attempt is then a no-op).
    pub fn trigger(self: &Arc<Self>) -> bool {
        let idle = !self.running();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.run().await {
                Ok(Some(report)) => log_report(&report),
                Ok(None) => tracing::debug!("triggered pass skipped, already running"),
                Err(e) => tracing::error!(error = %format!("{:#}", e), "sync pass failed"),
            }
        });
        idle
    }

    /// Run one full pass. `Ok(None)` if a pass is already in progress.
    pub async fn run(&self) -> Result<Option<RunReport>> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::info!("sync pass already running, skipping");
            return Ok(None);
        };

        let started_at = run_log::insert_run(&self.pool, Utc::now()).await?;
        tracing::info!(%started_at, "sync pass started");

        let discovered = Discovery::new(&*self.api, &self.limiter, &self.discovery)
            .discover_all()
            .await
            .context("discovery failed")?;

        let removed = pruner::reconcile(&self.pool, &discovered)
            .await
            .context("failed to remove departed accounts")?;

        let total = discovered.len();
        let stats = self.sync_accounts(discovered, started_at).await;

        Ok(Some(RunReport {
            started_at,
            discovered: total,
            removed: removed.len(),
            upserted: stats.upserted,
            gone: stats.gone,
            failed: stats.failed,
            repos_upserted: stats.repos_upserted,
            repos_pruned: stats.repos_pruned,
        }))
    }

    /// Bounded queue feeding `sync.workers` tasks; returns after all finish.
    async fn sync_accounts(&self, logins: BTreeSet<String>, stamp: DateTime<Utc>) -> WorkerStats {
        let workers = self.sync.workers.max(1);
        let (tx, rx) = mpsc::channel::<String>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let syncer = self.syncer.clone();
            set.spawn(async move {
                let mut stats = WorkerStats::default();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(login) = next else { break };
                    sync_account(&syncer, &login, stamp, &mut stats).await;
                }
                tracing::debug!(worker, upserted = stats.upserted, failed = stats.failed, "worker done");
                stats
            });
        }

        for login in logins {
            if tx.send(login).await.is_err() {
                tracing::error!("all sync workers exited early");
                break;
            }
        }
        drop(tx);

        let mut total = WorkerStats::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(stats) => total.merge(stats),
                Err(e) => tracing::error!(error = %e, "sync worker panicked"),
            }
        }
        total
    }

    /// Run a pass whenever the last one is older than `sync.interval_hours`.
    /// Never returns.
    pub async fn run_scheduler(&self) {
        let interval = self.sync.interval();
        let tick = Duration::from_secs(self.sync.check_interval_secs.max(1));

        loop {
            match self.last_run().await {
                Ok(last) if is_due(last, Utc::now(), interval) => match self.run().await {
                    Ok(Some(report)) => log_report(&report),
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %format!("{:#}", e), "scheduled sync pass failed"),
                },
                Ok(_) => tracing::trace!("no sync pass due"),
                Err(e) => tracing::error!(error = %format!("{:#}", e), "failed to read last run"),
            }
            tokio::time::sleep(tick).await;
        }
    }
}

async fn sync_account(syncer: &Syncer, login: &str, stamp: DateTime<Utc>, stats: &mut WorkerStats) {
    match syncer.add(login, stamp).await {
        Ok(AddOutcome::Removed) => stats.gone += 1,
        Ok(AddOutcome::Upserted) => {
            stats.upserted += 1;
            match syncer.sync_repos(login, stamp).await {
                Ok(repos) => {
                    stats.repos_upserted += repos.upserted;
                    stats.repos_pruned += repos.pruned;
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(login, error = %format!("{:#}", e), "repository sync failed");
                }
            }
        }
        Err(e) => {
            stats.failed += 1;
            tracing::warn!(login, error = %format!("{:#}", e), "account sync failed");
        }
    }
}

pub fn log_report(report: &RunReport) {
    tracing::info!(
        started_at = %report.started_at,
        discovered = report.discovered,
        removed = report.removed,
        upserted = report.upserted,
        gone = report.gone,
        failed = report.failed,
        repos_upserted = report.repos_upserted,
        repos_pruned = report.repos_pruned,
        "sync pass finished"
    );
}
