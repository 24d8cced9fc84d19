use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::stats::StatsSnapshot;
use crate::logs::LogStats;

pub type StatsCache = MemoryCache<StatsSnapshot>;
pub type LogStatsCache = MemoryCache<LogStats>;

struct CacheEntry<T> {
    value: Arc<T>,
    computed_at: Instant,
    // invalidation generation the computation started under
    generation: u64,
}

struct Slot<T> {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry<T>>>,
    generation: AtomicU64,
    // held for the whole duration of a recomputation
    flight: Mutex<()>,
}

/// Single-slot cache whose value expires after `ttl`.
///
/// Concurrent callers that find the slot empty or stale are coalesced: one
/// of them recomputes while the others wait for its result. A failed
/// recomputation is returned to the caller that ran it and leaves the
/// previous value in place.
pub struct MemoryCache<T> {
    data: Arc<Slot<T>>,
}

impl<T> Clone for MemoryCache<T> {
    fn clone(&self) -> Self {
        MemoryCache {
            data: self.data.clone(),
        }
    }
}

impl<T> MemoryCache<T> {
    pub fn new(ttl: Duration) -> MemoryCache<T> {
        MemoryCache {
            data: Arc::new(Slot {
                ttl,
                entry: RwLock::new(None),
                generation: AtomicU64::new(0),
                flight: Mutex::new(()),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.data.ttl
    }

    /// Cached value, recomputed with `compute` when missing or expired.
    pub async fn get<F, Fut, E>(&self, compute: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.fresh() {
            return Ok(value);
        }

        let _flight = self.data.flight.lock().await;
        // Someone else may have refreshed the slot while we were waiting.
        if let Some(value) = self.fresh() {
            debug!("Served value computed by a concurrent caller");
            return Ok(value);
        }

        let generation = self.data.generation.load(Ordering::Acquire);
        let value = Arc::new(compute().await?);
        {
            let mut entry = self
                .data
                .entry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *entry = Some(CacheEntry {
                value: value.clone(),
                computed_at: Instant::now(),
                generation,
            });
        }
        info!("Cache refreshed");
        Ok(value)
    }

    /// Force the next `get` to recompute, whatever the age of the value.
    pub fn invalidate(&self) {
        self.data.generation.fetch_add(1, Ordering::AcqRel);
        debug!("Cache invalidated");
    }

    /// Last successfully computed value, stale or not.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.data
            .entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|entry| entry.value.clone())
    }

    fn fresh(&self) -> Option<Arc<T>> {
        let generation = self.data.generation.load(Ordering::Acquire);
        let entry = self
            .data
            .entry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        entry
            .as_ref()
            .filter(|e| e.generation == generation && e.computed_at.elapsed() < self.data.ttl)
            .map(|e| e.value.clone())
    }
}
