//! Core data models used throughout the mirror.
//!
//! Two families of types live here:
//!
//! - **Provider records** ([`Profile`], [`RepoRecord`]) deserialize straight
//!   from GitHub REST responses. Every attribute is an `Option` because the
//!   API may omit any of them; "absent" and "zero" stay distinguishable.
//! - **Mirror rows** ([`Account`], [`Repository`]) are what the SQLite mirror
//!   stores and what the read queries return.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a mirrored account is a person or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Individual,
    Organization,
}

impl AccountKind {
    pub const ALL: [AccountKind; 2] = [AccountKind::Individual, AccountKind::Organization];

    /// Value stored in the `accounts.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Individual => "individual",
            AccountKind::Organization => "organization",
        }
    }

    /// Value of the `type:` qualifier in a GitHub user search.
    pub fn search_qualifier(&self) -> &'static str {
        match self {
            AccountKind::Individual => "user",
            AccountKind::Organization => "org",
        }
    }

    /// Map the `type` field of a GitHub user object (`"User"`, `"Organization"`).
    pub fn from_api_type(value: Option<&str>) -> Self {
        match value {
            Some(t) if t.eq_ignore_ascii_case("organization") => AccountKind::Organization,
            _ => AccountKind::Individual,
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" | "user" => Ok(AccountKind::Individual),
            "organization" | "org" => Ok(AccountKind::Organization),
            other => anyhow::bail!(
                "Unknown account kind: '{}'. Must be individual or organization.",
                other
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Provider records
// ═══════════════════════════════════════════════════════════════════════

/// Full user or organization profile as returned by `GET /users/{login}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub login: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub hireable: Option<bool>,
    pub blog: Option<String>,
    pub bio: Option<String>,
    pub followers: Option<i64>,
    pub following: Option<i64>,
    pub public_repos: Option<i64>,
    pub public_gists: Option<i64>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    pub disk_usage: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One entry of `GET /users/{login}/repos`.
///
/// The embedded `owner` object is not read: a repository always belongs to
/// the login it was listed for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoRecord {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub homepage: Option<String>,
    pub fork: Option<bool>,
    pub forks_count: Option<i64>,
    pub stargazers_count: Option<i64>,
    pub watchers_count: Option<i64>,
    pub subscribers_count: Option<i64>,
    pub open_issues_count: Option<i64>,
    pub size: Option<i64>,
    pub default_branch: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════
// Mirror rows
// ═══════════════════════════════════════════════════════════════════════

/// A mirrored account (one row of `accounts`).
///
/// `hidden` and `is_admin` are owned locally: the sync never writes them.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub login: String,
    pub kind: AccountKind,
    pub email: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub hireable: Option<bool>,
    pub blog: Option<String>,
    pub bio: Option<String>,
    pub followers: Option<i64>,
    pub following: Option<i64>,
    pub public_repos: Option<i64>,
    pub public_gists: Option<i64>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    pub disk_usage: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub hidden: bool,
    pub is_admin: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// A mirrored repository, identified by `(owner, name)`.
#[derive(Debug, Clone, Serialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub homepage: Option<String>,
    pub fork: Option<bool>,
    pub forks_count: Option<i64>,
    pub stargazers_count: Option<i64>,
    pub watchers_count: Option<i64>,
    pub subscribers_count: Option<i64>,
    pub open_issues_count: Option<i64>,
    pub size: Option<i64>,
    pub default_branch: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub refreshed_at: DateTime<Utc>,
}
