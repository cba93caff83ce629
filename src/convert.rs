//! Conversions between provider records, mirror rows, and stored timestamps.
//!
//! Provider timestamps are stored as Unix seconds. Pass stamps
//! (`refreshed_at`, `run_log.created_at`) are Unix milliseconds so that two
//! passes started within the same second remain distinguishable.

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::{Account, AccountKind, Profile, RepoRecord, Repository};

pub fn to_secs(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

pub fn from_secs(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid millisecond timestamp: {}", ms))
}

/// Build a mirror account from a fetched profile.
///
/// The local fields (`hidden`, `is_admin`) are left `false`; the store never
/// writes them during a sync so existing values survive.
pub fn profile_to_account(profile: Profile, refreshed_at: DateTime<Utc>) -> Result<Account> {
    let login = profile
        .login
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("profile has no login"))?;

    Ok(Account {
        kind: AccountKind::from_api_type(profile.account_type.as_deref()),
        login,
        email: profile.email,
        name: profile.name,
        location: profile.location,
        hireable: profile.hireable,
        blog: profile.blog,
        bio: profile.bio,
        followers: profile.followers,
        following: profile.following,
        public_repos: profile.public_repos,
        public_gists: profile.public_gists,
        avatar_url: profile.avatar_url,
        company: profile.company,
        disk_usage: profile.disk_usage,
        created_at: profile.created_at,
        updated_at: profile.updated_at,
        hidden: false,
        is_admin: false,
        refreshed_at: Some(refreshed_at),
    })
}

/// Build a mirror repository owned by `owner`. `None` if the record has no name.
pub fn record_to_repository(
    record: RepoRecord,
    owner: &str,
    refreshed_at: DateTime<Utc>,
) -> Option<Repository> {
    let name = record.name.filter(|n| !n.trim().is_empty())?;

    Some(Repository {
        owner: owner.to_string(),
        name,
        description: record.description,
        language: record.language,
        homepage: record.homepage,
        fork: record.fork,
        forks_count: record.forks_count,
        stargazers_count: record.stargazers_count,
        watchers_count: record.watchers_count,
        subscribers_count: record.subscribers_count,
        open_issues_count: record.open_issues_count,
        size: record.size,
        default_branch: record.default_branch,
        created_at: record.created_at,
        pushed_at: record.pushed_at,
        updated_at: record.updated_at,
        refreshed_at,
    })
}

pub fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let kind: String = row.try_get("kind")?;
    let refreshed_at: Option<i64> = row.try_get("refreshed_at")?;

    Ok(Account {
        login: row.try_get("login")?,
        kind: kind.parse()?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        hireable: row.try_get("hireable")?,
        blog: row.try_get("blog")?,
        bio: row.try_get("bio")?,
        followers: row.try_get("followers")?,
        following: row.try_get("following")?,
        public_repos: row.try_get("public_repos")?,
        public_gists: row.try_get("public_gists")?,
        avatar_url: row.try_get("avatar_url")?,
        company: row.try_get("company")?,
        disk_usage: row.try_get("disk_usage")?,
        created_at: from_secs(row.try_get("created_at")?),
        updated_at: from_secs(row.try_get("updated_at")?),
        hidden: row.try_get("hidden")?,
        is_admin: row.try_get("is_admin")?,
        refreshed_at: refreshed_at.map(from_millis).transpose()?,
    })
}

pub fn repository_from_row(row: &SqliteRow) -> Result<Repository> {
    Ok(Repository {
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        language: row.try_get("language")?,
        homepage: row.try_get("homepage")?,
        fork: row.try_get("fork")?,
        forks_count: row.try_get("forks_count")?,
        stargazers_count: row.try_get("stargazers_count")?,
        watchers_count: row.try_get("watchers_count")?,
        subscribers_count: row.try_get("subscribers_count")?,
        open_issues_count: row.try_get("open_issues_count")?,
        size: row.try_get("size")?,
        default_branch: row.try_get("default_branch")?,
        created_at: from_secs(row.try_get("created_at")?),
        pushed_at: from_secs(row.try_get("pushed_at")?),
        updated_at: from_secs(row.try_get("updated_at")?),
        refreshed_at: from_millis(row.try_get("refreshed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_without_login_is_rejected() {
        let err = profile_to_account(Profile::default(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("no login"));
    }

    #[test]
    fn test_profile_to_account_maps_kind_and_stamp() {
        let now = Utc::now();
        let profile = Profile {
            login: Some("acme".into()),
            account_type: Some("Organization".into()),
            company: Some("Acme".into()),
            ..Default::default()
        };
        let account = profile_to_account(profile, now).unwrap();
        assert_eq!(account.login, "acme");
        assert_eq!(account.kind, AccountKind::Organization);
        assert_eq!(account.refreshed_at, Some(now));
        assert!(!account.hidden);
    }

    #[test]
    fn test_repository_owner_is_synced_login() {
        let record = RepoRecord {
            name: Some("tool".into()),
            ..Default::default()
        };
        let repo = record_to_repository(record, "alice", Utc::now()).unwrap();
        assert_eq!(repo.owner, "alice");
        assert_eq!(repo.name, "tool");
    }

    #[test]
    fn test_nameless_repository_is_skipped() {
        assert!(record_to_repository(RepoRecord::default(), "alice", Utc::now()).is_none());
    }

    #[test]
    fn test_millis_round_trip_keeps_precision() {
        let ts = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(to_millis(ts), 1_700_000_000_123);
        assert_eq!(from_secs(None), None);
    }
}
