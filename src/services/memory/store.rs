//! Injectable counter storage behind the learning tables.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::{Mutex, TryLockError};
use tracing::debug;

/// Key-value store with atomic per-key read-modify-write.
///
/// The Pattern-Failure DB and Meta-Brain take one of these as an explicit
/// dependency, so tests and external state stores can supply their own.
pub trait StatStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    /// Apply `f` to the value at `key` (default-initialised when absent)
    /// while holding the key's lock; returns the updated value.
    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> V;

    fn remove(&self, key: &K) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every entry, in no particular order.
    fn entries(&self) -> Vec<(K, V)>;

    fn clear(&self);
}

/// In-memory [`StatStore`] on a sharded concurrent map.
pub struct CounterTable<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> CounterTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<K, V> Default for CounterTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StatStore<K, V> for CounterTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Default + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.clone())
    }

    fn put(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> V {
        let mut entry = self.map.entry(key).or_default();
        f(entry.value_mut());
        entry.value().clone()
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn clear(&self) {
        self.map.clear();
    }
}

/// Share of the limit freed by each eviction pass, as a divisor: a full
/// table is trimmed to `limit - limit / EVICTION_SLACK` so the scan runs
/// once per batch of new keys rather than on every settlement.
pub const EVICTION_SLACK: usize = 10;

/// Trim `store` below `limit` by evicting the smallest `weight` first (ties
/// broken by key) down to the low-water mark. `keep` is never evicted.
/// Returns the evicted keys in eviction order.
pub fn evict_least_observed<K, V, S>(
    store: &S,
    limit: usize,
    keep: &K,
    weight: impl Fn(&V) -> u32,
) -> Vec<K>
where
    K: Ord + Clone,
    S: StatStore<K, V> + ?Sized,
{
    let len = store.len();
    if len <= limit {
        return Vec::new();
    }

    let target = limit - limit / EVICTION_SLACK;
    let mut candidates: Vec<(u32, K)> = store
        .entries()
        .into_iter()
        .filter(|(key, _)| key != keep)
        .map(|(key, value)| (weight(&value), key))
        .collect();

    let excess = (len - target).min(candidates.len());
    if excess == 0 {
        return Vec::new();
    }
    if excess < candidates.len() {
        candidates.select_nth_unstable(excess - 1);
        candidates.truncate(excess);
    }
    candidates.sort();

    candidates
        .into_iter()
        .filter_map(|(_, key)| store.remove(&key).map(|_| key))
        .collect()
}

/// Optional size limit on a counter store with single-flight eviction.
///
/// Concurrent settlements that find the table over its limit do not all
/// scan it: whoever holds the pass evicts, the others return immediately.
/// The limit is therefore soft by at most the number of in-flight writers.
pub struct Retention {
    limit: Option<usize>,
    pass: Mutex<()>,
}

impl Retention {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            pass: Mutex::new(()),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Evict from `store` if it exceeds the limit. `keep` always survives.
    pub fn enforce<K, V, S>(&self, store: &S, keep: &K, weight: impl Fn(&V) -> u32) -> Vec<K>
    where
        K: Ord + Clone,
        S: StatStore<K, V> + ?Sized,
    {
        let Some(limit) = self.limit else {
            return Vec::new();
        };
        if store.len() <= limit {
            return Vec::new();
        }

        let _pass = match self.pass.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Eviction already running, skipping");
                return Vec::new();
            }
        };
        evict_least_observed(store, limit, keep, weight)
    }
}
