//! Aggregate-view cache invalidated by new synchronization passes.
//!
//! Entries are valid for exactly one pass: the cache remembers the run stamp
//! its entries were computed under, and a lookup with a different stamp drops
//! everything before storing the fresh value. Expensive aggregations run
//! outside the lock; only the final swap takes the write lock, so readers are
//! never blocked behind a query.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

type RunStamp = Option<DateTime<Utc>>;

struct CacheState<V> {
    run: RunStamp,
    /// Bumped by [`AggregateCache::clear`]; a compute that straddles a clear
    /// must not store its result.
    generation: u64,
    entries: HashMap<String, Arc<V>>,
}

pub struct AggregateCache<V> {
    state: RwLock<CacheState<V>>,
}

impl<V> Default for AggregateCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AggregateCache<V> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState {
                run: None,
                generation: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Return the cached value for `key` under `current_run`, computing it on miss.
    ///
    /// A failed computation is not cached. A value computed under a run older
    /// than the one the cache already holds is returned but not stored, and
    /// so is one whose computation overlapped a [`clear`](Self::clear).
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        current_run: RunStamp,
        compute: F,
    ) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let generation = {
            let state = self.state.read().map_err(|_| anyhow!("cache lock poisoned"))?;
            if state.run == current_run {
                if let Some(hit) = state.entries.get(key) {
                    return Ok(Arc::clone(hit));
                }
            }
            state.generation
        };

        let value = Arc::new(compute().await?);

        let mut state = self.state.write().map_err(|_| anyhow!("cache lock poisoned"))?;
        if current_run < state.run || state.generation != generation {
            return Ok(value);
        }
        if state.run != current_run {
            tracing::debug!(dropped = state.entries.len(), "new run, clearing aggregate cache");
            state.entries.clear();
            state.run = current_run;
        }
        state.entries.insert(key.to_string(), Arc::clone(&value));
        Ok(value)
    }

    /// Drop every entry, e.g. after a local write that changes what views show.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.entries.clear();
            state.generation += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
