//! Per-route response stores with LRU eviction and age expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::fetch::Response;

/// A cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Arc<Response>,
    /// When the URL was first stored.
    pub inserted_at: Duration,
    /// When the current response was fetched.
    pub validated_at: Duration,
}

impl CacheEntry {
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.validated_at)
    }
}

/// What an insertion removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub expired: usize,
    pub evicted: usize,
    /// Entries still over the bound after the sweep. Always zero unless the
    /// store's bookkeeping is inconsistent.
    pub overflow: usize,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Slots {
    by_url: HashMap<String, Slot>,
    tick: u64,
}

impl Slots {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// The store behind one route.
///
/// Every operation holds the store's lock for its whole read-modify-write, so
/// concurrent requests never observe more than `max_entries` entries.
#[derive(Debug)]
pub struct RouteStore {
    name: String,
    max_entries: usize,
    max_age: Duration,
    slots: Mutex<Slots>,
}

impl RouteStore {
    pub fn new(name: impl Into<String>, max_entries: usize, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            max_entries,
            max_age,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_expired(&self, entry: &CacheEntry, now: Duration) -> bool {
        entry.age(now) > self.max_age
    }

    /// Returns the entry for `url` and marks it most recently used.
    ///
    /// Entries older than the max age are treated as absent; they stay in
    /// place until the next insertion sweeps them.
    pub fn lookup(&self, url: &str, now: Duration) -> Option<CacheEntry> {
        let mut slots = self.slots.lock();
        let tick = slots.next_tick();
        let slot = slots.by_url.get_mut(url)?;
        if self.is_expired(&slot.entry, now) {
            debug!("[{}] expired: {}", self.name, url);
            return None;
        }
        slot.last_used = tick;
        Some(slot.entry.clone())
    }

    /// Stores `response` for `url`, replacing any previous entry, then drops
    /// expired entries and least recently used ones over the bound.
    pub fn insert(&self, url: &str, response: Arc<Response>, now: Duration) -> Sweep {
        let mut slots = self.slots.lock();
        let tick = slots.next_tick();

        let inserted_at = slots
            .by_url
            .get(url)
            .filter(|slot| !self.is_expired(&slot.entry, now))
            .map_or(now, |slot| slot.entry.inserted_at);
        slots.by_url.insert(
            url.to_string(),
            Slot {
                entry: CacheEntry {
                    response,
                    inserted_at,
                    validated_at: now,
                },
                last_used: tick,
            },
        );

        let before = slots.by_url.len();
        slots.by_url.retain(|_, slot| !self.is_expired(&slot.entry, now));
        let mut sweep = Sweep {
            expired: before - slots.by_url.len(),
            ..Sweep::default()
        };

        while slots.by_url.len() > self.max_entries {
            let Some(victim) = slots
                .by_url
                .iter()
                .min_by(|(a_url, a), (b_url, b)| {
                    a.last_used.cmp(&b.last_used).then_with(|| a_url.cmp(b_url))
                })
                .map(|(url, _)| url.clone())
            else {
                break;
            };
            debug!("[{}] evicting {}", self.name, victim);
            slots.by_url.remove(&victim);
            sweep.evicted += 1;
        }
        sweep.overflow = slots.by_url.len().saturating_sub(self.max_entries);

        sweep
    }

    pub fn remove(&self, url: &str) -> bool {
        self.slots.lock().by_url.remove(url).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.slots.lock().by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored URLs, sorted.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.slots.lock().by_url.keys().cloned().collect();
        urls.sort();
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;

    fn ok(body: &str) -> Arc<Response> {
        Arc::new(Response::new(StatusCode::OK, body))
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_lru_eviction() {
        let store = RouteStore::new("images", 2, secs(60));
        store.insert("a", ok("a"), secs(0));
        store.insert("b", ok("b"), secs(1));
        let sweep = store.insert("c", ok("c"), secs(2));

        assert_eq!(sweep.evicted, 1);
        assert_eq!(store.urls(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let store = RouteStore::new("images", 2, secs(60));
        store.insert("a", ok("a"), secs(0));
        store.insert("b", ok("b"), secs(1));
        assert!(store.lookup("a", secs(2)).is_some());
        store.insert("c", ok("c"), secs(3));

        assert_eq!(store.urls(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_expired_entries_are_absent_until_swept() {
        let store = RouteStore::new("api", 10, secs(300));
        store.insert("a", ok("a"), secs(0));

        assert!(store.lookup("a", secs(300)).is_some());
        assert!(store.lookup("a", secs(301)).is_none());
        assert_eq!(store.len(), 1);

        let sweep = store.insert("b", ok("b"), secs(302));
        assert_eq!(sweep.expired, 1);
        assert_eq!(store.urls(), vec!["b".to_string()]);
    }

    #[test]
    fn test_replacement_keeps_first_insert_time() {
        let store = RouteStore::new("api", 10, secs(300));
        store.insert("a", ok("old"), secs(0));
        store.insert("a", ok("new"), secs(100));

        let entry = store.lookup("a", secs(150)).unwrap();
        assert_eq!(entry.response.body, b"new".to_vec());
        assert_eq!(entry.inserted_at, secs(0));
        assert_eq!(entry.validated_at, secs(100));
        assert_eq!(entry.age(secs(150)), secs(50));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_count_never_exceeds_bound() {
        let store = RouteStore::new("api", 3, secs(60));
        for i in 0..20 {
            let sweep = store.insert(&format!("u{i}"), ok("x"), secs(i));
            assert_eq!(sweep.overflow, 0);
            assert!(store.len() <= 3);
        }
    }

    #[test]
    fn test_remove() {
        let store = RouteStore::new("api", 3, secs(60));
        store.insert("a", ok("a"), secs(0));
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }
}
