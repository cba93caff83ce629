//! Removes mirrored accounts that discovery no longer returns.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::store;

/// Delete every mirrored account not in `discovered`, repositories first.
///
/// Each account is removed in its own transaction. Returns the removed logins.
pub async fn reconcile(pool: &SqlitePool, discovered: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut removed = Vec::new();

    for login in store::all_logins(pool).await? {
        if discovered.contains(&login) {
            continue;
        }
        store::delete_account(pool, &login).await?;
        tracing::info!(login = %login, "account left the community, removed");
        removed.push(login);
    }

    Ok(removed)
}
