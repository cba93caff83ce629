//! TOML configuration parsing.
//!
//! ```toml
//! [db]
//! path = "./data/devmirror.sqlite"
//!
//! [github]
//! token_env = "GITHUB_TOKEN"
//!
//! [discovery]
//! locations = ["St. Louis", "STL", "St Louis", "Saint Louis"]
//! earliest = "2008-01-01"
//!
//! [sync]
//! workers = 2
//! interval_hours = 24
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GitHubConfig {
    /// Read the token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_user_agent() -> String {
    format!("devmirror/{}", env!("CARGO_PKG_VERSION"))
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Free-text `location:` values; an account matching any of them is a member.
    pub locations: Vec<String>,
    /// Only accounts with at least this many public repositories are searched for.
    #[serde(default = "default_min_repos")]
    pub min_repos: u32,
    /// Lower bound of the account-creation partitions.
    #[serde(default = "default_earliest")]
    pub earliest: NaiveDate,
    /// Initial width of each creation-date partition.
    #[serde(default = "default_partition_months")]
    pub partition_months: u32,
    /// Maximum number of results the search API returns for one query.
    #[serde(default = "default_result_cap")]
    pub result_cap: u64,
    /// Courtesy pause before every search request.
    #[serde(default = "default_query_delay_ms")]
    pub query_delay_ms: u64,
    /// Upper bound on pages followed for a single listing.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl DiscoveryConfig {
    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }
}

fn default_min_repos() -> u32 {
    1
}
fn default_earliest() -> NaiveDate {
    NaiveDate::from_ymd_opt(2008, 1, 1).unwrap_or_default()
}
fn default_partition_months() -> u32 {
    12
}
fn default_result_cap() -> u64 {
    1000
}
fn default_query_delay_ms() -> u64 {
    2000
}
fn default_max_pages() -> u32 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Number of accounts synced concurrently within a pass.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Minimum time between two passes started by the scheduler.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// How often the scheduler checks whether a pass is due.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Extra wait added after a quota reset time.
    #[serde(default = "default_quota_margin_secs")]
    pub quota_margin_secs: u64,
    /// Attempts allowed after a request was rejected for quota.
    #[serde(default = "default_max_quota_retries")]
    pub max_quota_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            interval_hours: default_interval_hours(),
            check_interval_secs: default_check_interval_secs(),
            quota_margin_secs: default_quota_margin_secs(),
            max_quota_retries: default_max_quota_retries(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.interval_hours as i64)
    }
}

/// One year.
const MAX_INTERVAL_HOURS: u64 = 24 * 366;

fn default_workers() -> usize {
    2
}
fn default_interval_hours() -> u64 {
    24
}
fn default_check_interval_secs() -> u64 {
    600
}
fn default_quota_margin_secs() -> u64 {
    1
}
fn default_max_quota_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.discovery.locations.iter().all(|l| l.trim().is_empty()) {
        anyhow::bail!("discovery.locations must name at least one location");
    }
    if config
        .discovery
        .locations
        .iter()
        .any(|l| l.contains('"'))
    {
        anyhow::bail!("discovery.locations must not contain double quotes");
    }
    if config.discovery.partition_months == 0 {
        anyhow::bail!("discovery.partition_months must be > 0");
    }
    if config.discovery.result_cap == 0 {
        anyhow::bail!("discovery.result_cap must be > 0");
    }
    if config.discovery.max_pages == 0 {
        anyhow::bail!("discovery.max_pages must be > 0");
    }
    if config.sync.workers == 0 {
        anyhow::bail!("sync.workers must be >= 1");
    }
    if config.sync.interval_hours == 0 || config.sync.interval_hours > MAX_INTERVAL_HOURS {
        anyhow::bail!(
            "sync.interval_hours must be between 1 and {}",
            MAX_INTERVAL_HOURS
        );
    }

    Ok(config)
}
