//! Shared fixtures: an in-memory GitHub and a throwaway database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use devmirror::config::{parse_config, Config};
use devmirror::db;
use devmirror::github::{ApiError, ApiResult, GitHubApi, Lookup, Page, RateInfo};
use devmirror::migrate;
use devmirror::models::{AccountKind, Profile, RepoRecord};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tempfile::TempDir;

// ─── Fake GitHub ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FakeAccount {
    pub kind: AccountKind,
    pub created: NaiveDate,
    pub profile: Profile,
    pub repos: Vec<RepoRecord>,
}

#[derive(Default)]
struct FakeState {
    /// Accounts returned by search (community members).
    members: BTreeMap<String, FakeAccount>,
    /// Logins whose profile lookup answers 404.
    gone: HashSet<String>,
    /// Logins whose repository listing fails on its last page.
    failing_repos: HashSet<String>,
    fail_search: bool,
    search_calls: Vec<String>,
    /// Quota headers for upcoming search responses, consumed in order.
    search_rates: VecDeque<RateInfo>,
    /// Quota headers attached to a login's profile response.
    profile_rates: HashMap<String, RateInfo>,
}

/// Answers the three provider calls from memory, honouring `created:` and
/// `type:` qualifiers, the search result cap, and page sizes.
pub struct FakeGitHub {
    state: Mutex<FakeState>,
    page_size: usize,
    result_cap: usize,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::with_limits(100, 1000)
    }

    pub fn with_limits(page_size: usize, result_cap: usize) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            page_size,
            result_cap,
        }
    }

    pub fn add_member(&self, login: &str, kind: AccountKind, created: NaiveDate, repos: Vec<RepoRecord>) {
        let profile = profile(login, kind, created);
        let mut state = self.state.lock().unwrap();
        state.members.insert(
            login.to_string(),
            FakeAccount {
                kind,
                created,
                profile,
                repos,
            },
        );
    }

    pub fn remove_member(&self, login: &str) {
        self.state.lock().unwrap().members.remove(login);
    }

    pub fn set_repos(&self, login: &str, repos: Vec<RepoRecord>) {
        if let Some(account) = self.state.lock().unwrap().members.get_mut(login) {
            account.repos = repos;
        }
    }

    pub fn set_company(&self, login: &str, company: &str) {
        if let Some(account) = self.state.lock().unwrap().members.get_mut(login) {
            account.profile.company = Some(company.to_string());
        }
    }

    pub fn mark_gone(&self, login: &str) {
        self.state.lock().unwrap().gone.insert(login.to_string());
    }

    pub fn fail_repos(&self, login: &str, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_repos.insert(login.to_string());
        } else {
            state.failing_repos.remove(login);
        }
    }

    pub fn fail_search(&self, fail: bool) {
        self.state.lock().unwrap().fail_search = fail;
    }

    pub fn queue_search_rate(&self, rate: RateInfo) {
        self.state.lock().unwrap().search_rates.push_back(rate);
    }

    pub fn set_profile_rate(&self, login: &str, rate: RateInfo) {
        self.state
            .lock()
            .unwrap()
            .profile_rates
            .insert(login.to_string(), rate);
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().search_calls.clone()
    }

    fn page_of<T: Clone>(&self, all: &[T], page: u32) -> (Vec<T>, Option<u32>) {
        let start = (page as usize - 1) * self.page_size;
        let items: Vec<T> = all.iter().skip(start).take(self.page_size).cloned().collect();
        let next = if start + self.page_size < all.len() {
            Some(page + 1)
        } else {
            None
        };
        (items, next)
    }
}

fn parse_query(query: &str) -> (Option<AccountKind>, Option<(NaiveDate, NaiveDate)>) {
    let mut kind = None;
    let mut window = None;
    for token in query.split_whitespace() {
        if let Some(t) = token.strip_prefix("type:") {
            kind = t.parse().ok();
        }
        if let Some(range) = token.strip_prefix("created:") {
            if let Some((from, to)) = range.split_once("..") {
                let from = NaiveDate::parse_from_str(from, "%Y-%m-%d").ok();
                let to = NaiveDate::parse_from_str(to, "%Y-%m-%d").ok();
                if let (Some(from), Some(to)) = (from, to) {
                    window = Some((from, to));
                }
            }
        }
    }
    (kind, window)
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn search_accounts(&self, query: &str, page: u32) -> ApiResult<Page<String>> {
        let (kind, window) = parse_query(query);
        let (matched, rate): (Vec<String>, RateInfo) = {
            let mut state = self.state.lock().unwrap();
            state.search_calls.push(query.to_string());
            if state.fail_search {
                return Err(ApiError::Status {
                    status: 503,
                    body: "search unavailable".to_string(),
                });
            }
            let rate = state.search_rates.pop_front().unwrap_or_default();
            let matched = state
                .members
                .iter()
                .filter(|(_, a)| kind.map_or(true, |k| a.kind == k))
                .filter(|(_, a)| window.map_or(true, |(from, to)| a.created >= from && a.created <= to))
                .map(|(login, _)| login.clone())
                .collect();
            (matched, rate)
        };

        let total = matched.len() as u64;
        let capped: Vec<String> = matched.into_iter().take(self.result_cap).collect();
        let (items, next_page) = self.page_of(&capped, page);
        Ok(Page {
            items,
            rate,
            next_page,
            total_count: Some(total),
        })
    }

    async fn get_profile(&self, login: &str) -> ApiResult<(Lookup<Profile>, RateInfo)> {
        let state = self.state.lock().unwrap();
        let rate = state.profile_rates.get(login).copied().unwrap_or_default();
        if state.gone.contains(login) {
            return Ok((Lookup::Gone, rate));
        }
        match state.members.get(login) {
            Some(account) => Ok((Lookup::Found(account.profile.clone()), rate)),
            None => Ok((Lookup::Gone, rate)),
        }
    }

    async fn list_repositories(&self, login: &str, page: u32) -> ApiResult<Page<RepoRecord>> {
        let (repos, failing) = {
            let state = self.state.lock().unwrap();
            let repos = state
                .members
                .get(login)
                .map(|a| a.repos.clone())
                .unwrap_or_default();
            (repos, state.failing_repos.contains(login))
        };

        let (items, next_page) = self.page_of(&repos, page);
        if failing && next_page.is_none() {
            return Err(ApiError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(Page {
            items,
            rate: RateInfo::default(),
            next_page,
            total_count: None,
        })
    }
}

// ─── Records ────────────────────────────────────────────────────────

/// Quota headers reporting no calls left until `reset_at`.
pub fn exhausted(reset_at: chrono::DateTime<Utc>) -> RateInfo {
    RateInfo {
        limit: Some(30),
        remaining: Some(0),
        reset_at: Some(reset_at),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn profile(login: &str, kind: AccountKind, created: NaiveDate) -> Profile {
    Profile {
        login: Some(login.to_string()),
        account_type: Some(
            match kind {
                AccountKind::Individual => "User",
                AccountKind::Organization => "Organization",
            }
            .to_string(),
        ),
        name: Some(format!("{} name", login)),
        location: Some("St. Louis, MO".to_string()),
        followers: Some(10),
        public_repos: Some(3),
        created_at: Some(Utc.from_utc_datetime(&created.and_hms_opt(12, 0, 0).unwrap())),
        ..Default::default()
    }
}

pub fn repo(owner: &str, name: &str, language: Option<&str>, stars: i64) -> RepoRecord {
    RepoRecord {
        name: Some(name.to_string()),
        description: Some(format!("{} by {}", name, owner)),
        language: language.map(str::to_string),
        fork: Some(false),
        forks_count: Some(stars / 2),
        stargazers_count: Some(stars),
        ..Default::default()
    }
}

// ─── Config and database ────────────────────────────────────────────

pub fn test_config(tmp: &TempDir, result_cap: u64) -> Config {
    let db_path = tmp.path().join("devmirror.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[discovery]
locations = ["St. Louis", "STL"]
earliest = "2015-01-01"
partition_months = 12
result_cap = {}
query_delay_ms = 0

[sync]
workers = 3
quota_margin_secs = 0

[server]
bind = "127.0.0.1:0"
"#,
        db_path.display(),
        result_cap
    );
    parse_config(&content).unwrap()
}

pub async fn test_pool(cfg: &Config) -> SqlitePool {
    migrate::run_migrations(cfg).await.unwrap();
    db::connect(cfg).await.unwrap()
}
