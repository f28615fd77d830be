//! A small capacity-bounded cache memoizing `(table_id, key) -> value`
//! lookups, keyed the way the point-read path names things (§4.5: "an
//! optional per-key cache, keyed by `table_id|key`, memoizes found values").
//!
//! Two eviction policies, both hand-rolled rather than pulled in from a
//! crate: `Lru` tracks access order in a `VecDeque` alongside the `HashMap`;
//! `TwoChoice` picks two random occupied slots on eviction and drops
//! whichever was touched longer ago — an approximate LRU that avoids the
//! bookkeeping cost of exact ordering.
use std::collections::{HashMap, VecDeque};

/// `None` caches a tombstone; the outer lookup result (present/absent in
/// this table) still needs `SstReader::get`'s `Option<Option<_>>` shape, so
/// this cache only memoizes hits, never "not present in this table".
pub type CacheKey = (String, Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Lru,
    TwoChoice,
}

struct Entry {
    value: Option<Vec<u8>>,
    bytes: usize,
    clock: u64,
}

/// Bounded by total bytes of cached values (plus a flat per-entry overhead
/// for the key), not entry count — matches `cache.bytes` in the
/// configuration table.
pub struct ValueCache {
    capacity_bytes: usize,
    used_bytes: usize,
    policy: CachePolicy,
    map: HashMap<CacheKey, Entry>,
    lru_order: VecDeque<CacheKey>,
    clock: u64,
}

fn entry_cost(key: &CacheKey, value: &Option<Vec<u8>>) -> usize {
    key.0.len() + key.1.len() + value.as_ref().map(Vec::len).unwrap_or(0)
}

impl ValueCache {
    pub fn new(capacity_bytes: usize, policy: CachePolicy) -> Self {
        Self {
            capacity_bytes,
            used_bytes: 0,
            policy,
            map: HashMap::new(),
            lru_order: VecDeque::new(),
            clock: 0,
        }
    }

    /// Looks up `(table_id, key)`, touching the entry's recency on a hit.
    pub fn get(&mut self, table_id: &str, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let cache_key = (table_id.to_string(), key.to_vec());
        self.clock += 1;
        let clock = self.clock;
        let value = self.map.get_mut(&cache_key).map(|e| {
            e.clock = clock;
            e.value.clone()
        });
        if value.is_some() && self.policy == CachePolicy::Lru {
            self.touch_lru(&cache_key);
        }
        value
    }

    fn touch_lru(&mut self, key: &CacheKey) {
        if let Some(pos) = self.lru_order.iter().position(|k| k == key) {
            self.lru_order.remove(pos);
        }
        self.lru_order.push_back(key.clone());
    }

    pub fn insert(&mut self, table_id: &str, key: &[u8], value: Option<Vec<u8>>) {
        if self.capacity_bytes == 0 {
            return;
        }
        let cache_key = (table_id.to_string(), key.to_vec());
        let cost = entry_cost(&cache_key, &value);
        if cost > self.capacity_bytes {
            return;
        }

        if let Some(old) = self.map.remove(&cache_key) {
            self.used_bytes = self.used_bytes.saturating_sub(old.bytes);
            self.lru_order.retain(|k| k != &cache_key);
        }

        while self.used_bytes + cost > self.capacity_bytes && !self.map.is_empty() {
            self.evict_one();
        }

        self.clock += 1;
        self.map.insert(
            cache_key.clone(),
            Entry {
                value,
                bytes: cost,
                clock: self.clock,
            },
        );
        self.used_bytes += cost;
        if self.policy == CachePolicy::Lru {
            self.lru_order.push_back(cache_key);
        }
    }

    fn evict_one(&mut self) {
        let victim = match self.policy {
            CachePolicy::Lru => self.lru_order.pop_front(),
            CachePolicy::TwoChoice => self.pick_two_choice_victim(),
        };
        if let Some(victim) = victim {
            if let Some(entry) = self.map.remove(&victim) {
                self.used_bytes = self.used_bytes.saturating_sub(entry.bytes);
            }
            self.lru_order.retain(|k| k != &victim);
        }
    }

    fn pick_two_choice_victim(&self) -> Option<CacheKey> {
        let keys: Vec<&CacheKey> = self.map.keys().collect();
        if keys.is_empty() {
            return None;
        }
        if keys.len() == 1 {
            return Some(keys[0].clone());
        }
        let i = rand::random::<usize>() % keys.len();
        let mut j = rand::random::<usize>() % keys.len();
        if j == i {
            j = (j + 1) % keys.len();
        }
        let older = |k: &CacheKey| self.map.get(k).map(|e| e.clock).unwrap_or(u64::MAX);
        if older(keys[i]) <= older(keys[j]) {
            Some(keys[i].clone())
        } else {
            Some(keys[j].clone())
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}
