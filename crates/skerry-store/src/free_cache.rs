//! In-memory cache of reclaimable offsets.
//!
//! A bounded per-shard set that lets the allocator reuse freed slots
//! without a metadata-store lookup. Purely advisory: the metadata store
//! stays authoritative, so entries can be dropped at any time.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use skerry_types::SHARD_COUNT;
use tracing::debug;

/// Offsets cached per shard before the oldest entry is evicted.
const MAX_OFFSETS_PER_SHARD: usize = 512;

pub(crate) struct OffsetCache {
    shards: Vec<Mutex<ShardOffsets>>,
}

#[derive(Default)]
struct ShardOffsets {
    /// Insertion order. May hold offsets that were since taken or removed;
    /// those are skipped when popped.
    order: VecDeque<u64>,
    offsets: HashSet<u64>,
}

impl OffsetCache {
    pub(crate) fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(ShardOffsets::default()))
                .collect(),
        }
    }

    /// Remove and return some cached free offset for the shard.
    pub(crate) fn get(&self, shard: u8) -> Option<u64> {
        let mut slots = self.shards[shard as usize]
            .lock()
            .expect("offset cache lock poisoned");
        while let Some(offset) = slots.order.pop_front() {
            if slots.offsets.remove(&offset) {
                return Some(offset);
            }
        }
        None
    }

    /// Record a reclaimable offset, evicting the oldest entry at capacity.
    pub(crate) fn set(&self, shard: u8, offset: u64) {
        let mut slots = self.shards[shard as usize]
            .lock()
            .expect("offset cache lock poisoned");
        if !slots.offsets.insert(offset) {
            return;
        }
        slots.order.push_back(offset);
        while slots.offsets.len() > MAX_OFFSETS_PER_SHARD {
            let Some(oldest) = slots.order.pop_front() else {
                break;
            };
            if slots.offsets.remove(&oldest) {
                debug!(shard, offset = oldest, "evicted cached free offset");
            }
        }
    }

    /// Forget a specific offset, usually because it is about to be reused.
    pub(crate) fn remove(&self, shard: u8, offset: u64) {
        let mut slots = self.shards[shard as usize]
            .lock()
            .expect("offset cache lock poisoned");
        slots.offsets.remove(&offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_empty_returns_none() {
        let cache = OffsetCache::new();
        assert_eq!(cache.get(0), None);
    }

    #[test]
    fn test_get_removes_the_offset() {
        let cache = OffsetCache::new();
        cache.set(3, 4096);
        assert_eq!(cache.get(3), Some(4096));
        assert_eq!(cache.get(3), None);
    }

    #[test]
    fn test_shards_are_independent() {
        let cache = OffsetCache::new();
        cache.set(1, 0);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some(0));
    }

    #[test]
    fn test_remove_prevents_reuse() {
        let cache = OffsetCache::new();
        cache.set(5, 8192);
        cache.remove(5, 8192);
        assert_eq!(cache.get(5), None);
    }

    #[test]
    fn test_duplicate_set_is_ignored() {
        let cache = OffsetCache::new();
        cache.set(0, 4096);
        cache.set(0, 4096);
        assert_eq!(cache.get(0), Some(4096));
        assert_eq!(cache.get(0), None);
    }

    #[test]
    fn test_oldest_entry_evicted_at_capacity() {
        let cache = OffsetCache::new();
        for i in 0..=MAX_OFFSETS_PER_SHARD as u64 {
            cache.set(0, i * 4096);
        }
        // Offset 0 was the oldest and should be gone; everything else
        // drains out in insertion order.
        let mut drained = Vec::new();
        while let Some(offset) = cache.get(0) {
            drained.push(offset);
        }
        assert_eq!(drained.len(), MAX_OFFSETS_PER_SHARD);
        assert!(!drained.contains(&0));
        assert_eq!(drained[0], 4096);
    }
}
