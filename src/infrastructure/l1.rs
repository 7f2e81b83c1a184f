//! L1 in-process cache tier
//!
//! A bounded map from L1 keys to lightweight response records with a
//! pluggable eviction policy. Inserting over capacity evicts exactly one
//! victim, chosen by the policy, inside the same lock window as the insert.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::{EvictionStrategy, L1CacheConfig};

/// Response record held in the L1 tier. The embedding never lands here.
#[derive(Debug, Clone)]
pub struct L1Entry {
    /// Id of the backing L2 entry, used for invalidation
    pub entry_id: String,
    pub response: String,
    pub metadata: Option<serde_json::Value>,
    pub cached_at: Instant,
    pub access_count: u64,
}

impl L1Entry {
    pub fn new(
        entry_id: impl Into<String>,
        response: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            response: response.into(),
            metadata,
            cached_at: Instant::now(),
            access_count: 0,
        }
    }
}

/// Point-in-time L1 statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L1Stats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct FreqSlot {
    entry: L1Entry,
    seq: u64,
}

enum Store {
    Recency(LruCache<String, L1Entry>),
    Frequency {
        map: HashMap<String, FreqSlot>,
        // (access_count, last_access_seq, key): the first element is the
        // least frequently used entry, ties resolved oldest-access-first
        order: BTreeSet<(u64, u64, String)>,
    },
    Age {
        map: HashMap<String, L1Entry>,
        // Insertion order; stamped with cached_at so re-inserted keys leave
        // detectable ghosts at their old position
        queue: VecDeque<(String, Instant)>,
        ttl: Duration,
    },
}

struct Inner {
    store: Store,
    max_size: usize,
    seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded in-process key→entry map with pluggable eviction.
pub struct L1Cache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for L1Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("L1Cache")
            .field("size", &inner.store_len())
            .field("max_size", &inner.max_size)
            .finish()
    }
}

impl L1Cache {
    pub fn new(config: &L1CacheConfig) -> Self {
        let max_size = config.max_size.max(1);
        let store = match config.eviction_strategy {
            EvictionStrategy::Recency => Store::Recency(LruCache::new(
                NonZeroUsize::new(max_size).expect("max_size is positive"),
            )),
            EvictionStrategy::Frequency => Store::Frequency {
                map: HashMap::new(),
                order: BTreeSet::new(),
            },
            EvictionStrategy::Age => Store::Age {
                map: HashMap::new(),
                queue: VecDeque::new(),
                ttl: Duration::from_secs(config.ttl_seconds),
            },
        };

        Self {
            inner: Mutex::new(Inner {
                store,
                max_size,
                seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Look up a key, updating access bookkeeping on a hit.
    pub fn get(&self, key: &str) -> Option<L1Entry> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.seq += 1;
        let seq = inner.seq;

        let found = match &mut inner.store {
            Store::Recency(lru) => lru.get_mut(key).map(|entry| {
                entry.access_count += 1;
                entry.clone()
            }),
            Store::Frequency { map, order } => match map.get_mut(key) {
                Some(slot) => {
                    order.remove(&(slot.entry.access_count, slot.seq, key.to_string()));
                    slot.entry.access_count += 1;
                    slot.seq = seq;
                    order.insert((slot.entry.access_count, slot.seq, key.to_string()));
                    Some(slot.entry.clone())
                }
                None => None,
            },
            Store::Age { map, ttl, .. } => match map.get_mut(key) {
                Some(entry) if entry.cached_at.elapsed() > *ttl => {
                    map.remove(key);
                    None
                }
                Some(entry) => {
                    entry.access_count += 1;
                    Some(entry.clone())
                }
                None => None,
            },
        };

        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }

        found
    }

    /// Insert or replace an entry, evicting one victim if over capacity.
    pub fn put(&self, key: impl Into<String>, entry: L1Entry) {
        let key = key.into();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.seq += 1;
        let seq = inner.seq;
        let max_size = inner.max_size;

        match &mut inner.store {
            Store::Recency(lru) => {
                if lru.len() >= max_size && !lru.contains(&key) {
                    lru.pop_lru();
                    inner.evictions += 1;
                }
                lru.put(key, entry);
            }
            Store::Frequency { map, order } => {
                if let Some(old) = map.remove(&key) {
                    order.remove(&(old.entry.access_count, old.seq, key.clone()));
                } else if map.len() >= max_size {
                    if let Some(victim) = order.iter().next().cloned() {
                        order.remove(&victim);
                        map.remove(&victim.2);
                        inner.evictions += 1;
                    }
                }
                order.insert((entry.access_count, seq, key.clone()));
                map.insert(key, FreqSlot { entry, seq });
            }
            Store::Age { map, queue, .. } => {
                if !map.contains_key(&key) && map.len() >= max_size {
                    // Pop ghosts left by re-inserted or deleted keys; the
                    // front-most live entry is the oldest insertion, so it is
                    // also the expired one whenever anything is expired.
                    while let Some((front_key, stamp)) = queue.front().cloned() {
                        let live = map
                            .get(&front_key)
                            .map(|e| e.cached_at == stamp)
                            .unwrap_or(false);
                        queue.pop_front();
                        if live {
                            map.remove(&front_key);
                            inner.evictions += 1;
                            break;
                        }
                    }
                }
                queue.push_back((key.clone(), entry.cached_at));
                map.insert(key, entry);
            }
        }
    }

    /// Remove a single key; `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();

        match &mut inner.store {
            Store::Recency(lru) => lru.pop(key).is_some(),
            Store::Frequency { map, order } => match map.remove(key) {
                Some(slot) => {
                    order.remove(&(slot.entry.access_count, slot.seq, key.to_string()));
                    true
                }
                None => false,
            },
            Store::Age { map, .. } => map.remove(key).is_some(),
        }
    }

    /// Remove every entry whose backing L2 id is in `entry_ids`; returns the
    /// number removed. Used by tag invalidation.
    pub fn remove_entries(&self, entry_ids: &HashSet<String>) -> usize {
        let mut inner = self.inner.lock();

        match &mut inner.store {
            Store::Recency(lru) => {
                let keys: Vec<String> = lru
                    .iter()
                    .filter(|(_, e)| entry_ids.contains(&e.entry_id))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    lru.pop(key);
                }
                keys.len()
            }
            Store::Frequency { map, order } => {
                let keys: Vec<String> = map
                    .iter()
                    .filter(|(_, s)| entry_ids.contains(&s.entry.entry_id))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    if let Some(slot) = map.remove(key) {
                        order.remove(&(slot.entry.access_count, slot.seq, key.clone()));
                    }
                }
                keys.len()
            }
            Store::Age { map, .. } => {
                let keys: Vec<String> = map
                    .iter()
                    .filter(|(_, e)| entry_ids.contains(&e.entry_id))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    map.remove(key);
                }
                keys.len()
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();

        match &mut inner.store {
            Store::Recency(lru) => lru.clear(),
            Store::Frequency { map, order } => {
                map.clear();
                order.clear();
            }
            Store::Age { map, queue, .. } => {
                map.clear();
                queue.clear();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> L1Stats {
        let inner = self.inner.lock();
        L1Stats {
            size: inner.store_len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

impl Inner {
    fn store_len(&self) -> usize {
        match &self.store {
            Store::Recency(lru) => lru.len(),
            Store::Frequency { map, .. } => map.len(),
            Store::Age { map, .. } => map.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(strategy: EvictionStrategy, max_size: usize, ttl_seconds: u64) -> L1Cache {
        L1Cache::new(&L1CacheConfig {
            enabled: true,
            max_size,
            ttl_seconds,
            eviction_strategy: strategy,
        })
    }

    fn entry(id: &str, response: &str) -> L1Entry {
        L1Entry::new(id, response, None)
    }

    #[test]
    fn test_get_put_roundtrip() {
        let cache = cache(EvictionStrategy::Recency, 10, 300);
        cache.put("k1", entry("sem:1", "hello"));

        let hit = cache.get("k1").unwrap();
        assert_eq!(hit.response, "hello");
        assert_eq!(hit.entry_id, "sem:1");
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_recency_evicts_least_recently_accessed() {
        let cache = cache(EvictionStrategy::Recency, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));

        // Touch a so b becomes the LRU victim
        cache.get("a");
        cache.put("c", entry("sem:c", "rc"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_recency_store_three_evicts_first() {
        // max_size=2: storing A, B, C in order evicts A
        let cache = cache(EvictionStrategy::Recency, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));
        cache.put("c", entry("sem:c", "rc"));

        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_frequency_evicts_least_frequent() {
        let cache = cache(EvictionStrategy::Frequency, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));

        for _ in 0..3 {
            cache.get("a");
        }
        cache.get("b");

        cache.put("c", entry("sem:c", "rc"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_frequency_ties_broken_by_recency() {
        let cache = cache(EvictionStrategy::Frequency, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));

        // Equal counts; a accessed before b, so a is the older access
        cache.get("a");
        cache.get("b");

        cache.put("c", entry("sem:c", "rc"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_age_lazy_expiry_on_access() {
        let cache = cache(EvictionStrategy::Age, 10, 0);
        cache.put("k", entry("sem:k", "r"));

        std::thread::sleep(Duration::from_millis(10));

        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_age_evicts_oldest_insertion() {
        let cache = cache(EvictionStrategy::Age, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));
        cache.put("c", entry("sem:c", "rc"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_age_reinsert_leaves_no_stale_ghost() {
        let cache = cache(EvictionStrategy::Age, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));
        // Refresh a; its old queue position becomes a ghost
        cache.put("a", entry("sem:a", "ra2"));

        cache.put("c", entry("sem:c", "rc"));

        // b was the oldest live insertion, not a
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = cache(EvictionStrategy::Recency, 2, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));
        cache.put("a", entry("sem:a", "ra2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a").unwrap().response, "ra2");
    }

    #[test]
    fn test_delete() {
        let cache = cache(EvictionStrategy::Frequency, 10, 300);
        cache.put("a", entry("sem:a", "ra"));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_remove_entries_by_id() {
        let cache = cache(EvictionStrategy::Recency, 10, 300);
        cache.put("k1", entry("sem:1", "r1"));
        cache.put("k2", entry("sem:2", "r2"));
        cache.put("k3", entry("sem:3", "r3"));

        let ids: HashSet<String> = ["sem:1".to_string(), "sem:3".to_string()].into();
        let removed = cache.remove_entries(&ids);

        assert_eq!(removed, 2);
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = cache(EvictionStrategy::Age, 10, 300);
        cache.put("a", entry("sem:a", "ra"));
        cache.put("b", entry("sem:b", "rb"));

        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_access_count_bumps() {
        let cache = cache(EvictionStrategy::Recency, 10, 300);
        cache.put("a", entry("sem:a", "ra"));

        cache.get("a");
        cache.get("a");
        let hit = cache.get("a").unwrap();

        assert_eq!(hit.access_count, 3);
    }

    #[test]
    fn test_concurrent_access_is_safe() {
        use std::sync::Arc;

        let cache = Arc::new(cache(EvictionStrategy::Recency, 100, 300));
        let mut handles = Vec::new();

        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("k{}-{}", t, i);
                    cache.put(&key, L1Entry::new(format!("sem:{}", key), "r", None));
                    cache.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 100);
        assert!(cache.stats().hits > 0);
    }
}
