//! Append-only record of synchronization passes.
//!
//! The latest record is "last run": the staleness threshold for repository
//! pruning and the version key of the aggregate cache. Records are strictly
//! increasing; a pass started within the same millisecond as (or, with clock
//! skew, before) the previous one is stamped one millisecond after it.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::convert::{from_millis, to_millis};

/// Append a record for a pass starting at `now` and return its stamp.
pub async fn insert_run(pool: &SqlitePool, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    // Stored stamps have millisecond resolution; compare at that resolution.
    let now = from_millis(to_millis(now))?;
    let stamp = match last_run(pool).await? {
        Some(previous) if previous >= now => previous + Duration::milliseconds(1),
        _ => now,
    };

    sqlx::query("INSERT INTO run_log (created_at) VALUES (?)")
        .bind(to_millis(stamp))
        .execute(pool)
        .await?;

    Ok(stamp)
}

pub async fn last_run(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM run_log")
        .fetch_one(pool)
        .await?;
    latest.map(from_millis).transpose()
}
