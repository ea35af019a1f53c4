//! In-memory metadata store backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use skerry_types::{Address, Meta, SHARD_COUNT};
use tracing::debug;

use crate::error::MetaError;
use crate::traits::{MetaStore, ShardSlot, slots_view};

/// Volatile [`MetaStore`] backed by a locked map.
///
/// Useful for tests and for stores configured to run without metadata
/// persistence. A single mutex keeps the record map, the per-shard free
/// sets, and the free-slot counters mutually consistent.
pub struct MemoryMetaStore {
    inner: Mutex<Inner>,
}

struct Inner {
    /// Address → location record.
    chunks: HashMap<Address, Meta>,
    /// Reclaimable offsets per shard.
    free: Vec<BTreeSet<u64>>,
    /// Free-slot counter per shard.
    slots: Vec<i64>,
}

impl MemoryMetaStore {
    /// Create an empty in-memory metadata store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                chunks: HashMap::new(),
                free: vec![BTreeSet::new(); SHARD_COUNT as usize],
                slots: vec![0; SHARD_COUNT as usize],
            }),
        }
    }

    /// Apply a raw delta to a shard's free-slot counter (for testing).
    #[cfg(test)]
    pub(crate) fn adjust_free_slots(&self, shard: u8, delta: i64) {
        let mut inner = self.inner.lock().expect("meta lock poisoned");
        inner.slots[shard as usize] += delta;
    }
}

impl Default for MemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStore for MemoryMetaStore {
    fn get(&self, addr: &Address) -> Result<Meta, MetaError> {
        let inner = self.inner.lock().expect("meta lock poisoned");
        inner
            .chunks
            .get(addr)
            .copied()
            .ok_or_else(|| MetaError::NotFound(addr.clone()))
    }

    fn set(
        &self,
        addr: &Address,
        shard: u8,
        reclaimed: bool,
        meta: Meta,
    ) -> Result<Option<u64>, MetaError> {
        let mut inner = self.inner.lock().expect("meta lock poisoned");
        if reclaimed {
            inner.free[shard as usize].remove(&meta.offset);
            inner.slots[shard as usize] -= 1;
        }
        let previous = inner.chunks.insert(addr.clone(), meta);
        let displaced = previous.map(|p| p.offset).filter(|&old| old != meta.offset);
        if let Some(old) = displaced {
            inner.free[shard as usize].insert(old);
            inner.slots[shard as usize] += 1;
            debug!(address = %addr, shard, offset = old, "released replaced slot");
        }
        Ok(displaced)
    }

    fn remove(&self, addr: &Address, shard: u8) -> Result<(), MetaError> {
        let mut inner = self.inner.lock().expect("meta lock poisoned");
        let meta = inner
            .chunks
            .remove(addr)
            .ok_or_else(|| MetaError::NotFound(addr.clone()))?;
        inner.free[shard as usize].insert(meta.offset);
        inner.slots[shard as usize] += 1;
        debug!(address = %addr, shard, offset = meta.offset, "removed chunk record");
        Ok(())
    }

    fn count(&self) -> Result<usize, MetaError> {
        let inner = self.inner.lock().expect("meta lock poisoned");
        Ok(inner.chunks.len())
    }

    fn free_offset(&self, shard: u8) -> Result<Option<u64>, MetaError> {
        let inner = self.inner.lock().expect("meta lock poisoned");
        Ok(inner.free[shard as usize].iter().next().copied())
    }

    fn iterate(&self, f: &mut dyn FnMut(Address, Meta) -> bool) -> Result<(), MetaError> {
        let inner = self.inner.lock().expect("meta lock poisoned");
        for (addr, meta) in &inner.chunks {
            if f(addr.clone(), *meta) {
                break;
            }
        }
        Ok(())
    }

    fn shard_slots(&self, sorted: bool) -> Vec<ShardSlot> {
        let inner = self.inner.lock().expect("meta lock poisoned");
        slots_view(&inner.slots, sorted)
    }

    fn close(&self) -> Result<(), MetaError> {
        Ok(())
    }
}
