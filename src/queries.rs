//! Read-side views over the mirror, plus the local-field operations.
//!
//! | View                  | Cached | Hidden accounts |
//! |-----------------------|--------|-----------------|
//! | `popular_languages`   | no     | excluded        |
//! | `popular_accounts`    | no     | excluded        |
//! | `profile`             | no     | `None`          |
//! | `language_leaders`    | yes    | excluded        |
//! | `search`              | no     | excluded        |
//!
//! `language_leaders` is the expensive one (every repository of a language,
//! grouped by owner) and goes through an [`AggregateCache`] keyed by the last
//! run stamp, so it is recomputed at most once per pass and language.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::AggregateCache;
use crate::convert::{account_from_row, repository_from_row};
use crate::models::{Account, AccountKind, Repository};
use crate::run_log;
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct LanguageStat {
    pub language: String,
    pub repositories: i64,
    pub owners: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub login: String,
    pub kind: AccountKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub followers: Option<i64>,
    pub public_repos: Option<i64>,
    pub stars: i64,
    pub forks: i64,
}

/// An account's repositories sharing one language (`None` = undetected).
#[derive(Debug, Clone, Serialize)]
pub struct LanguageGroup {
    pub language: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub account: Account,
    pub stars: i64,
    pub forks: i64,
    pub languages: Vec<LanguageGroup>,
}

/// One owner's repositories in a language.
#[derive(Debug, Clone, Serialize)]
pub struct LanguageLeader {
    pub owner: String,
    pub avatar_url: Option<String>,
    pub stars: i64,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Accounts,
    Repositories,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum SearchResults {
    Accounts(Vec<Account>),
    Repositories(Vec<Repository>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Accounts(items) => items.len(),
            SearchResults::Repositories(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Queries {
    pool: SqlitePool,
    leaders: AggregateCache<Vec<LanguageLeader>>,
    pass_running: Option<Arc<AtomicBool>>,
}

impl Queries {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            leaders: AggregateCache::new(),
            pass_running: None,
        }
    }

    /// Like [`new`](Self::new), but aggregates are not cached while `flag`
    /// reports a pass in progress.
    pub fn with_pass_flag(pool: SqlitePool, flag: Arc<AtomicBool>) -> Self {
        Self {
            pass_running: Some(flag),
            ..Self::new(pool)
        }
    }

    fn pass_in_progress(&self) -> bool {
        self.pass_running
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub async fn popular_languages(&self) -> Result<Vec<LanguageStat>> {
        let rows = sqlx::query(
            r#"
            SELECT r.language AS language,
                   COUNT(*) AS repositories,
                   COUNT(DISTINCT r.owner) AS owners
            FROM repositories r
            JOIN accounts a ON a.login = r.owner
            WHERE r.language IS NOT NULL AND a.hidden = 0
            GROUP BY r.language
            ORDER BY repositories DESC, language
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LanguageStat {
                    language: row.try_get("language")?,
                    repositories: row.try_get("repositories")?,
                    owners: row.try_get("owners")?,
                })
            })
            .collect()
    }

    /// Visible accounts ranked by total stars, optionally filtered by kind and
    /// by a case-insensitive company substring.
    pub async fn popular_accounts(
        &self,
        kind: Option<AccountKind>,
        company: Option<&str>,
    ) -> Result<Vec<AccountSummary>> {
        let kind = kind.map(|k| k.as_str());
        let company = company
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(like_pattern);

        let rows = sqlx::query(
            r#"
            SELECT a.login, a.kind, a.name, a.avatar_url, a.company, a.location,
                   a.followers, a.public_repos,
                   COALESCE(SUM(r.stargazers_count), 0) AS stars,
                   COALESCE(SUM(r.forks_count), 0) AS forks
            FROM accounts a
            LEFT JOIN repositories r ON r.owner = a.login
            WHERE a.hidden = 0
              AND (?1 IS NULL OR a.kind = ?1)
              AND (?2 IS NULL OR LOWER(a.company) LIKE ?2 ESCAPE '\')
            GROUP BY a.login
            ORDER BY stars DESC, a.login
            "#,
        )
        .bind(kind)
        .bind(company)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(AccountSummary {
                    login: row.try_get("login")?,
                    kind: kind.parse()?,
                    name: row.try_get("name")?,
                    avatar_url: row.try_get("avatar_url")?,
                    company: row.try_get("company")?,
                    location: row.try_get("location")?,
                    followers: row.try_get("followers")?,
                    public_repos: row.try_get("public_repos")?,
                    stars: row.try_get("stars")?,
                    forks: row.try_get("forks")?,
                })
            })
            .collect()
    }

    /// A visible account with its repositories grouped by language.
    pub async fn profile(&self, login: &str) -> Result<Option<ProfileView>> {
        let Some(account) = store::get_account(&self.pool, login).await? else {
            return Ok(None);
        };
        if account.hidden {
            return Ok(None);
        }

        let repos = store::repositories_for(&self.pool, &account.login).await?;
        let mut groups: BTreeMap<Option<String>, LanguageGroup> = BTreeMap::new();
        for repo in repos {
            let group = groups
                .entry(repo.language.clone())
                .or_insert_with(|| LanguageGroup {
                    language: repo.language.clone(),
                    stars: 0,
                    forks: 0,
                    repositories: Vec::new(),
                });
            group.stars += repo.stargazers_count.unwrap_or(0);
            group.forks += repo.forks_count.unwrap_or(0);
            group.repositories.push(repo);
        }

        let mut languages: Vec<LanguageGroup> = groups.into_values().collect();
        languages.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.language.cmp(&b.language)));

        Ok(Some(ProfileView {
            stars: languages.iter().map(|g| g.stars).sum(),
            forks: languages.iter().map(|g| g.forks).sum(),
            account,
            languages,
        }))
    }

    /// Owners ranked by stars within `language` (case-insensitive).
    ///
    /// Cached per run. A run is stamped when its pass starts, so a result
    /// read while a pass is still writing would be cached with partial data
    /// until the next pass; such reads bypass the cache instead.
    pub async fn language_leaders(&self, language: &str) -> Result<Arc<Vec<LanguageLeader>>> {
        let key = language.trim().to_lowercase();
        if self.pass_in_progress() {
            return Ok(Arc::new(self.compute_language_leaders(&key).await?));
        }
        let current_run = run_log::last_run(&self.pool).await?;

        self.leaders
            .get_or_compute(&key, current_run, || self.compute_language_leaders(&key))
            .await
    }

    async fn compute_language_leaders(&self, language: &str) -> Result<Vec<LanguageLeader>> {
        let rows = sqlx::query(
            r#"
            SELECT r.*, a.avatar_url AS owner_avatar_url
            FROM repositories r
            JOIN accounts a ON a.login = r.owner
            WHERE LOWER(r.language) = ? AND a.hidden = 0
            ORDER BY r.owner, r.stargazers_count DESC, r.name
            "#,
        )
        .bind(language)
        .fetch_all(&self.pool)
        .await?;

        let mut leaders: Vec<LanguageLeader> = Vec::new();
        for row in &rows {
            let repo = repository_from_row(row)?;
            match leaders.last_mut() {
                Some(leader) if leader.owner == repo.owner => {
                    leader.stars += repo.stargazers_count.unwrap_or(0);
                    leader.repositories.push(repo);
                }
                _ => leaders.push(LanguageLeader {
                    owner: repo.owner.clone(),
                    avatar_url: row.try_get("owner_avatar_url")?,
                    stars: repo.stargazers_count.unwrap_or(0),
                    repositories: vec![repo],
                }),
            }
        }

        leaders.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.owner.cmp(&b.owner)));
        Ok(leaders)
    }

    /// Case-insensitive substring search. An empty term matches nothing.
    pub async fn search(&self, term: &str, kind: SearchKind) -> Result<SearchResults> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(match kind {
                SearchKind::Accounts => SearchResults::Accounts(Vec::new()),
                SearchKind::Repositories => SearchResults::Repositories(Vec::new()),
            });
        }
        let pattern = like_pattern(term);

        match kind {
            SearchKind::Accounts => {
                let rows = sqlx::query(
                    r#"
                    SELECT * FROM accounts
                    WHERE hidden = 0
                      AND (LOWER(login) LIKE ?1 ESCAPE '\' OR LOWER(name) LIKE ?1 ESCAPE '\')
                    ORDER BY followers DESC, login
                    "#,
                )
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;
                let accounts = rows.iter().map(account_from_row).collect::<Result<_>>()?;
                Ok(SearchResults::Accounts(accounts))
            }
            SearchKind::Repositories => {
                let rows = sqlx::query(
                    r#"
                    SELECT r.* FROM repositories r
                    JOIN accounts a ON a.login = r.owner
                    WHERE a.hidden = 0
                      AND (LOWER(r.name) LIKE ?1 ESCAPE '\' OR LOWER(r.description) LIKE ?1 ESCAPE '\')
                    ORDER BY r.stargazers_count DESC, r.owner, r.name
                    "#,
                )
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;
                let repos = rows.iter().map(repository_from_row).collect::<Result<_>>()?;
                Ok(SearchResults::Repositories(repos))
            }
        }
    }

    // ============ Local fields ============

    pub async fn set_hidden(&self, login: &str, hidden: bool) -> Result<bool> {
        let changed = store::set_hidden(&self.pool, login, hidden).await?;
        self.leaders.clear();
        Ok(changed)
    }

    pub async fn set_admin(&self, login: &str, is_admin: bool) -> Result<bool> {
        store::set_admin(&self.pool, login, is_admin).await
    }

    pub async fn remove_account(&self, login: &str) -> Result<bool> {
        let removed = store::delete_account(&self.pool, login).await?;
        self.leaders.clear();
        Ok(removed)
    }
}

/// `%term%` for a lowercase `LIKE ... ESCAPE '\'`, with wildcards in `term` escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
