use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use keel_types::Position;

use crate::entry::{AfterImage, Intention};

/// A cached, classified log entry, shared by immutable ref.
#[derive(Clone, Debug)]
pub enum CacheEntry {
    Intention(Arc<Intention>),
    AfterImage(Arc<AfterImage>),
}

impl CacheEntry {
    /// The shared intention ref, if this entry is one.
    pub fn as_intention(&self) -> Option<Arc<Intention>> {
        match self {
            Self::Intention(i) => Some(Arc::clone(i)),
            Self::AfterImage(_) => None,
        }
    }
}

struct Slot {
    entry: CacheEntry,
    pinned: bool,
}

struct CacheInner {
    slots: HashMap<Position, Slot>,
    /// Insertion order of transient slots; may hold stale positions for
    /// promoted slots, which eviction skips.
    transient_fifo: VecDeque<Position>,
    transient_len: usize,
}

/// Position-indexed cache of classified log entries. One structure, two
/// insertion paths: [`insert`](EntryCache::insert) pins an entry for good
/// (reader loops, batch reads), while [`publish`](EntryCache::publish) adds
/// a transient append pre-fetch entry, bounded by an insertion-order FIFO.
/// Both are idempotent with publisher-wins semantics: the first entry stored
/// for a position is the one every caller gets back.
pub struct EntryCache {
    inner: Mutex<CacheInner>,
    transient_cap: usize,
}

impl EntryCache {
    pub fn new(transient_cap: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                transient_fifo: VecDeque::new(),
                transient_len: 0,
            }),
            transient_cap,
        }
    }

    /// Insert and pin. If the position is already cached the existing entry
    /// wins, is promoted to pinned, and is returned.
    pub fn insert(&self, position: Position, entry: CacheEntry) -> CacheEntry {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;
        if let Some(slot) = inner.slots.get_mut(&position) {
            if !slot.pinned {
                slot.pinned = true;
                inner.transient_len -= 1;
            }
            return slot.entry.clone();
        }
        inner.slots.insert(
            position,
            Slot {
                entry: entry.clone(),
                pinned: true,
            },
        );
        entry
    }

    /// Insert as transient, evicting the oldest transient beyond the cap.
    /// If the position is already cached the existing entry wins unchanged.
    pub fn publish(&self, position: Position, entry: CacheEntry) -> CacheEntry {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;
        if let Some(slot) = inner.slots.get(&position) {
            return slot.entry.clone();
        }
        inner.slots.insert(
            position,
            Slot {
                entry: entry.clone(),
                pinned: false,
            },
        );
        inner.transient_fifo.push_back(position);
        inner.transient_len += 1;

        while inner.transient_len > self.transient_cap {
            let Some(oldest) = inner.transient_fifo.pop_front() else {
                break;
            };
            // Skip positions whose slots were promoted since queuing.
            let evictable = inner.slots.get(&oldest).is_some_and(|s| !s.pinned);
            if evictable {
                inner.slots.remove(&oldest);
                inner.transient_len -= 1;
            }
        }
        entry
    }

    /// Look up a position without changing its tier.
    pub fn get(&self, position: Position) -> Option<CacheEntry> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.slots.get(&position).map(|s| s.entry.clone())
    }

    /// Look up a position, promoting a transient hit to pinned: a position
    /// the reader loops have observed must stay cached.
    pub fn pin(&self, position: Position) -> Option<CacheEntry> {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;
        let slot = inner.slots.get_mut(&position)?;
        if !slot.pinned {
            slot.pinned = true;
            inner.transient_len -= 1;
        }
        Some(slot.entry.clone())
    }

    /// Number of cached entries across both tiers.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::IntentionBody;

    fn intention(position: Position) -> CacheEntry {
        CacheEntry::Intention(Arc::new(Intention::new(
            IntentionBody::new(0, position),
            position,
        )))
    }

    fn cached_token(cache: &EntryCache, position: Position) -> u64 {
        cache
            .get(position)
            .and_then(|e| e.as_intention())
            .map(|i| i.token())
            .expect("position cached")
    }

    #[test]
    fn first_publisher_wins() {
        let cache = EntryCache::new(16);
        let first = Arc::new(Intention::new(IntentionBody::new(0, 100), 3));
        cache.insert(3, CacheEntry::Intention(Arc::clone(&first)));

        // A second insert for the same position returns the original ref.
        let second = Arc::new(Intention::new(IntentionBody::new(0, 200), 3));
        let got = cache.insert(3, CacheEntry::Intention(second));
        let got = got.as_intention().unwrap();
        assert!(Arc::ptr_eq(&got, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_inserts_converge_on_one_ref() {
        use std::thread;

        let cache = Arc::new(EntryCache::new(16));
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                cache
                    .insert(
                        7,
                        CacheEntry::Intention(Arc::new(Intention::new(
                            IntentionBody::new(0, t),
                            7,
                        ))),
                    )
                    .as_intention()
                    .unwrap()
            }));
        }
        let refs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &refs[1..] {
            assert!(Arc::ptr_eq(r, &refs[0]));
        }
    }

    #[test]
    fn transient_tier_evicts_oldest_beyond_cap() {
        let cache = EntryCache::new(2);
        cache.publish(0, intention(0));
        cache.publish(1, intention(1));
        cache.publish(2, intention(2));

        assert!(cache.get(0).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn pinned_entries_never_evicted() {
        let cache = EntryCache::new(1);
        cache.insert(0, intention(0));
        cache.publish(1, intention(1));
        cache.publish(2, intention(2));
        cache.publish(3, intention(3));

        // The pinned entry survives; only transients cycle.
        assert!(cache.get(0).is_some());
        assert!(cache.get(3).is_some());
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn pin_promotes_transient_out_of_fifo() {
        let cache = EntryCache::new(1);
        cache.publish(0, intention(0));
        assert!(cache.pin(0).is_some());

        // The promoted entry no longer counts against the transient cap.
        cache.publish(1, intention(1));
        cache.publish(2, intention(2));
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn publish_respects_existing_entry() {
        let cache = EntryCache::new(16);
        let pinned = Arc::new(Intention::new(IntentionBody::new(0, 42), 5));
        cache.insert(5, CacheEntry::Intention(pinned));
        cache.publish(5, intention(5));
        assert_eq!(cached_token(&cache, 5), 42);
    }

    #[test]
    fn pin_on_missing_position_is_none() {
        let cache = EntryCache::new(16);
        assert!(cache.pin(9).is_none());
    }
}
