//! L1 tier: exact-text match, bounded capacity, least-recently-accessed eviction.

use std::collections::HashMap;

struct Entry {
    value: String,
    recency: u64,
}

/// Bounded exact-text map. Not thread-safe on its own; the owning `TwoTierCache`
/// guards it with a single `tokio::sync::Mutex` (§5 — cheap since L1 ops are O(1)).
pub struct L1Cache {
    entries: HashMap<String, Entry>,
    capacity: usize,
    clock: u64,
}

impl L1Cache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), capacity, clock: 0 }
    }

    pub fn get(&mut self, prompt: &str) -> Option<String> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(prompt)?;
        entry.recency = clock;
        Some(entry.value.clone())
    }

    /// Insert or overwrite, evicting the least-recently-accessed entry on overflow.
    pub fn put(&mut self, prompt: String, value: String) {
        self.clock += 1;
        let clock = self.clock;

        if !self.entries.contains_key(&prompt) && self.entries.len() >= self.capacity {
            if let Some(lru_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.recency)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&lru_key);
            }
        }

        self.entries.insert(prompt, Entry { value, recency: clock });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.clock = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = L1Cache::new(10);
        cache.put("hi".to_string(), "ENH(hi)".to_string());
        assert_eq!(cache.get("hi"), Some("ENH(hi)".to_string()));
    }

    #[test]
    fn miss_returns_none() {
        let mut cache = L1Cache::new(10);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn overflow_evicts_least_recently_accessed() {
        let mut cache = L1Cache::new(2);
        cache.put("a".to_string(), "A".to_string());
        cache.put("b".to_string(), "B".to_string());
        // touch "a" so "b" becomes the least-recently-accessed entry
        cache.get("a");
        cache.put("c".to_string(), "C".to_string());

        assert_eq!(cache.get("b"), None, "b should have been evicted");
        assert_eq!(cache.get("a"), Some("A".to_string()));
        assert_eq!(cache.get("c"), Some("C".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = L1Cache::new(10);
        cache.put("a".to_string(), "A".to_string());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }
}
