use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index the mirror needs. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Mirrored accounts (users and organizations)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            login TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            email TEXT,
            name TEXT,
            location TEXT,
            hireable INTEGER,
            blog TEXT,
            bio TEXT,
            followers INTEGER,
            following INTEGER,
            public_repos INTEGER,
            public_gists INTEGER,
            avatar_url TEXT,
            company TEXT,
            disk_usage INTEGER,
            created_at INTEGER,
            updated_at INTEGER,
            hidden INTEGER NOT NULL DEFAULT 0,
            is_admin INTEGER NOT NULL DEFAULT 0,
            refreshed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Repositories owned by mirrored accounts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            language TEXT,
            homepage TEXT,
            fork INTEGER,
            forks_count INTEGER,
            stargazers_count INTEGER,
            watchers_count INTEGER,
            subscribers_count INTEGER,
            open_issues_count INTEGER,
            size INTEGER,
            default_branch TEXT,
            created_at INTEGER,
            pushed_at INTEGER,
            updated_at INTEGER,
            refreshed_at INTEGER NOT NULL,
            PRIMARY KEY (owner, name),
            FOREIGN KEY (owner) REFERENCES accounts(login)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per synchronization pass
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_log (
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_language ON repositories(language)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_repositories_owner_refreshed ON repositories(owner, refreshed_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_log_created_at ON run_log(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
