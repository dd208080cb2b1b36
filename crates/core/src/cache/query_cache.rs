//! In-memory query cache with shared in-flight fetches.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{FetchOptions, QueryKey};
use crate::error::ServiceError;
use crate::metrics::{CACHE_DISCARDED_WRITES, CACHE_EVICTIONS, CACHE_LOOKUPS};

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, ServiceError>>>;

struct InFlight {
    seq: u64,
    future: SharedFetch,
}

struct Entry {
    value: Option<CachedValue>,
    updated_at: Option<Instant>,
    last_access: Instant,
    invalidated: bool,
    /// Sequence of the latest write or invalidation. Fetches issued before it
    /// cannot overwrite the entry.
    data_seq: u64,
    gc_time: Duration,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn new(now: Instant, gc_time: Duration) -> Self {
        Self {
            value: None,
            updated_at: None,
            last_access: now,
            invalidated: false,
            data_seq: 0,
            gc_time,
            in_flight: None,
        }
    }

    fn fresh_value(&self, now: Instant, stale_time: Duration) -> Option<&CachedValue> {
        if self.invalidated {
            return None;
        }
        match (&self.value, self.updated_at) {
            (Some(value), Some(at)) if now.duration_since(at) < stale_time => Some(value),
            _ => None,
        }
    }
}

/// Captured state of one entry, used to roll back an optimistic write.
pub struct Snapshot {
    value: Option<CachedValue>,
    updated_at: Option<Instant>,
    invalidated: bool,
}

/// Query cache keyed by [`QueryKey`].
///
/// - fresh data is served without calling the fetcher
/// - at most one fetch per key is in flight; concurrent callers share it
/// - a fetch issued before the entry's latest write or invalidation is
///   discarded when it completes, so results land in completion order except
///   where they are already superseded
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    seq: AtomicU64,
    defaults: FetchOptions,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

impl QueryCache {
    pub fn new(defaults: FetchOptions) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            defaults,
        }
    }

    /// Windows applied when a caller does not pick its own.
    pub fn defaults(&self) -> FetchOptions {
        self.defaults
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        // A poisoned map only means a panic happened mid-update of plain data.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return cached data for `key` if fresh, otherwise run (or join) a fetch.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: FetchOptions,
        fetcher: F,
    ) -> Result<T, ServiceError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let (seq, shared) = {
            let mut entries = self.lock();
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now, options.gc_time));
            entry.last_access = now;
            entry.gc_time = options.gc_time;

            if let Some(value) = entry.fresh_value(now, options.stale_time) {
                if let Some(value) = value.downcast_ref::<T>() {
                    CACHE_LOOKUPS
                        .with_label_values(&[key.family(), "hit"])
                        .inc();
                    trace!(key = %key, "cache hit");
                    return Ok(value.clone());
                }
            }

            match &entry.in_flight {
                Some(in_flight) => {
                    CACHE_LOOKUPS
                        .with_label_values(&[key.family(), "joined"])
                        .inc();
                    trace!(key = %key, "joining in-flight fetch");
                    (in_flight.seq, in_flight.future.clone())
                }
                None => {
                    CACHE_LOOKUPS
                        .with_label_values(&[key.family(), "miss"])
                        .inc();
                    let seq = self.next_seq();
                    let fut = fetcher();
                    let shared = async move { fut.await.map(|v| Arc::new(v) as CachedValue) }
                        .boxed()
                        .shared();
                    entry.in_flight = Some(InFlight {
                        seq,
                        future: shared.clone(),
                    });
                    debug!(key = %key, seq = seq, "cache miss, fetching");
                    (seq, shared)
                }
            }
        };

        let result = shared.await;
        self.complete(&key, seq, &result);

        let value = result?;
        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            ServiceError::Validation(format!("cached value for {} has an unexpected type", key))
        })
    }

    fn complete(&self, key: &QueryKey, seq: u64, result: &Result<CachedValue, ServiceError>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };

        if entry.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            entry.in_flight = None;
        }

        let Ok(value) = result else {
            return;
        };

        if seq > entry.data_seq {
            entry.value = Some(Arc::clone(value));
            entry.updated_at = Some(Instant::now());
            entry.invalidated = false;
            entry.data_seq = seq;
        } else if seq < entry.data_seq {
            CACHE_DISCARDED_WRITES.inc();
            debug!(
                key = %key,
                seq = seq,
                current = entry.data_seq,
                "discarding superseded fetch result"
            );
        }
    }

    /// Cached value regardless of staleness.
    pub fn peek<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        entry.last_access = Instant::now();
        entry.value.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Write a value directly, marking it fresh. Supersedes any in-flight fetch.
    pub fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let seq = self.next_seq();
        let mut entries = self.lock();
        let now = Instant::now();
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(now, self.defaults.gc_time));
        entry.value = Some(Arc::new(value));
        entry.updated_at = Some(now);
        entry.last_access = now;
        entry.invalidated = false;
        entry.data_seq = seq;
    }

    /// Mark one entry stale. The next `fetch` refetches, and fetches already
    /// in flight can no longer write to it.
    pub fn invalidate(&self, key: &QueryKey) {
        let seq = self.next_seq();
        if let Some(entry) = self.lock().get_mut(key) {
            Self::invalidate_entry(entry, seq);
        }
    }

    /// Mark stale every entry of the given families owned by `scope`.
    pub fn invalidate_scope(&self, families: &[&str], scope: &str) -> usize {
        let seq = self.next_seq();
        let mut count = 0;
        for (key, entry) in self.lock().iter_mut() {
            if key.scope() == Some(scope) && families.contains(&key.family()) {
                Self::invalidate_entry(entry, seq);
                count += 1;
            }
        }
        debug!(scope = scope, families = ?families, count = count, "invalidated cache entries");
        count
    }

    /// Mark stale every entry of one family, across all scopes.
    pub fn invalidate_family(&self, family: &str) -> usize {
        let seq = self.next_seq();
        let mut count = 0;
        for (key, entry) in self.lock().iter_mut() {
            if key.family() == family {
                Self::invalidate_entry(entry, seq);
                count += 1;
            }
        }
        count
    }

    fn invalidate_entry(entry: &mut Entry, seq: u64) {
        entry.invalidated = true;
        entry.in_flight = None;
        entry.data_seq = entry.data_seq.max(seq);
    }

    /// Drop every entry owned by `scope`.
    pub fn clear_scope(&self, scope: &str) {
        self.lock().retain(|key, _| key.scope() != Some(scope));
    }

    pub fn remove(&self, key: &QueryKey) {
        self.lock().remove(key);
    }

    pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
        self.lock()
            .get(key)
            .map(|e| e.fresh_value(Instant::now(), stale_time).is_none())
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capture an entry so an optimistic write can be undone.
    pub fn snapshot(&self, key: &QueryKey) -> Snapshot {
        match self.lock().get(key) {
            Some(entry) => Snapshot {
                value: entry.value.clone(),
                updated_at: entry.updated_at,
                invalidated: entry.invalidated,
            },
            None => Snapshot {
                value: None,
                updated_at: None,
                invalidated: false,
            },
        }
    }

    /// Put back a snapshot taken earlier. Supersedes any in-flight fetch.
    pub fn restore(&self, key: QueryKey, snapshot: Snapshot) {
        let seq = self.next_seq();
        let mut entries = self.lock();
        if snapshot.value.is_none() {
            entries.remove(&key);
            return;
        }
        let now = Instant::now();
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(now, self.defaults.gc_time));
        entry.value = snapshot.value;
        entry.updated_at = snapshot.updated_at;
        entry.invalidated = snapshot.invalidated;
        entry.last_access = now;
        entry.data_seq = seq;
    }

    /// Remove entries that have gone unused for their gc window.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| {
            e.in_flight.is_some() || now.duration_since(e.last_access) < e.gc_time
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            CACHE_EVICTIONS.inc_by(evicted as u64);
            debug!(evicted = evicted, "evicted expired cache entries");
        }
        evicted
    }

    /// Run [`evict_expired`](Self::evict_expired) periodically.
    pub fn spawn_gc_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.evict_expired();
                    }
                    None => break,
                }
            }
        })
    }
}
