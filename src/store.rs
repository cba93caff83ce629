//! SQL writes and point lookups against the mirror tables.
//!
//! Upserts are update-then-insert: an `UPDATE` keyed by identity runs first and
//! an `INSERT` follows only when no row matched. The `UPDATE` column lists
//! never include `hidden` or `is_admin`, which belong to the local operator.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::convert::{account_from_row, repository_from_row, to_millis, to_secs};
use crate::models::{Account, Repository};

// ============ Accounts ============

/// Update the provider fields of an existing account. Returns rows affected.
pub async fn update_account(pool: &SqlitePool, account: &Account) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE accounts SET
            kind = ?, email = ?, name = ?, location = ?, hireable = ?, blog = ?,
            bio = ?, followers = ?, following = ?, public_repos = ?, public_gists = ?,
            avatar_url = ?, company = ?, disk_usage = ?, created_at = ?, updated_at = ?,
            refreshed_at = ?
        WHERE login = ?
        "#,
    )
    .bind(account.kind.as_str())
    .bind(&account.email)
    .bind(&account.name)
    .bind(&account.location)
    .bind(account.hireable)
    .bind(&account.blog)
    .bind(&account.bio)
    .bind(account.followers)
    .bind(account.following)
    .bind(account.public_repos)
    .bind(account.public_gists)
    .bind(&account.avatar_url)
    .bind(&account.company)
    .bind(account.disk_usage)
    .bind(to_secs(account.created_at))
    .bind(to_secs(account.updated_at))
    .bind(account.refreshed_at.map(to_millis))
    .bind(&account.login)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_account(pool: &SqlitePool, account: &Account) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO accounts (
            login, kind, email, name, location, hireable, blog, bio, followers,
            following, public_repos, public_gists, avatar_url, company, disk_usage,
            created_at, updated_at, refreshed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.login)
    .bind(account.kind.as_str())
    .bind(&account.email)
    .bind(&account.name)
    .bind(&account.location)
    .bind(account.hireable)
    .bind(&account.blog)
    .bind(&account.bio)
    .bind(account.followers)
    .bind(account.following)
    .bind(account.public_repos)
    .bind(account.public_gists)
    .bind(&account.avatar_url)
    .bind(&account.company)
    .bind(account.disk_usage)
    .bind(to_secs(account.created_at))
    .bind(to_secs(account.updated_at))
    .bind(account.refreshed_at.map(to_millis))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn upsert_account(pool: &SqlitePool, account: &Account) -> Result<()> {
    if update_account(pool, account).await? == 0 {
        insert_account(pool, account).await?;
    }
    Ok(())
}

/// Delete an account and its repositories atomically. Returns whether the
/// account existed.
pub async fn delete_account(pool: &SqlitePool, login: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM repositories WHERE owner = ?")
        .bind(login)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM accounts WHERE login = ?")
        .bind(login)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_account(pool: &SqlitePool, login: &str) -> Result<Option<Account>> {
    let row = sqlx::query("SELECT * FROM accounts WHERE login = ?")
        .bind(login)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(account_from_row).transpose()
}

pub async fn all_logins(pool: &SqlitePool) -> Result<Vec<String>> {
    let logins: Vec<String> = sqlx::query_scalar("SELECT login FROM accounts ORDER BY login")
        .fetch_all(pool)
        .await?;
    Ok(logins)
}

/// Set the local `hidden` flag. Returns `false` if the account is unknown.
pub async fn set_hidden(pool: &SqlitePool, login: &str, hidden: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE accounts SET hidden = ? WHERE login = ?")
        .bind(hidden)
        .bind(login)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Set the local `is_admin` flag. Returns `false` if the account is unknown.
pub async fn set_admin(pool: &SqlitePool, login: &str, is_admin: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE accounts SET is_admin = ? WHERE login = ?")
        .bind(is_admin)
        .bind(login)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============ Repositories ============

pub async fn update_repository(pool: &SqlitePool, repo: &Repository) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE repositories SET
            description = ?, language = ?, homepage = ?, fork = ?, forks_count = ?,
            stargazers_count = ?, watchers_count = ?, subscribers_count = ?,
            open_issues_count = ?, size = ?, default_branch = ?, created_at = ?,
            pushed_at = ?, updated_at = ?, refreshed_at = ?
        WHERE owner = ? AND name = ?
        "#,
    )
    .bind(&repo.description)
    .bind(&repo.language)
    .bind(&repo.homepage)
    .bind(repo.fork)
    .bind(repo.forks_count)
    .bind(repo.stargazers_count)
    .bind(repo.watchers_count)
    .bind(repo.subscribers_count)
    .bind(repo.open_issues_count)
    .bind(repo.size)
    .bind(&repo.default_branch)
    .bind(to_secs(repo.created_at))
    .bind(to_secs(repo.pushed_at))
    .bind(to_secs(repo.updated_at))
    .bind(to_millis(repo.refreshed_at))
    .bind(&repo.owner)
    .bind(&repo.name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_repository(pool: &SqlitePool, repo: &Repository) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO repositories (
            owner, name, description, language, homepage, fork, forks_count,
            stargazers_count, watchers_count, subscribers_count, open_issues_count,
            size, default_branch, created_at, pushed_at, updated_at, refreshed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&repo.owner)
    .bind(&repo.name)
    .bind(&repo.description)
    .bind(&repo.language)
    .bind(&repo.homepage)
    .bind(repo.fork)
    .bind(repo.forks_count)
    .bind(repo.stargazers_count)
    .bind(repo.watchers_count)
    .bind(repo.subscribers_count)
    .bind(repo.open_issues_count)
    .bind(repo.size)
    .bind(&repo.default_branch)
    .bind(to_secs(repo.created_at))
    .bind(to_secs(repo.pushed_at))
    .bind(to_secs(repo.updated_at))
    .bind(to_millis(repo.refreshed_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn upsert_repository(pool: &SqlitePool, repo: &Repository) -> Result<()> {
    if update_repository(pool, repo).await? == 0 {
        insert_repository(pool, repo).await?;
    }
    Ok(())
}

/// Delete `owner`'s repositories not refreshed since `before`.
pub async fn prune_stale_repositories(
    pool: &SqlitePool,
    owner: &str,
    before: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM repositories WHERE owner = ? AND refreshed_at < ?")
        .bind(owner)
        .bind(to_millis(before))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn repositories_for(pool: &SqlitePool, owner: &str) -> Result<Vec<Repository>> {
    let rows = sqlx::query(
        "SELECT * FROM repositories WHERE owner = ? ORDER BY stargazers_count DESC, name",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.iter().map(repository_from_row).collect()
}
