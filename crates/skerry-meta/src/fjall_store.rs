//! Persistent metadata store backend on Fjall.
//!
//! Layout:
//!
//! - `chunks` keyspace — address bytes → postcard-serialized
//!   [`Meta`](skerry_types::Meta).
//! - `free` keyspace — `shard byte ++ offset (8 bytes big-endian)` → empty.
//!   Big-endian keeps lexicographic order aligned with numeric order so a
//!   prefix scan over one shard byte walks its free offsets in order.
//!
//! The per-shard free-slot counters live in memory and are rebuilt by
//! scanning the `free` keyspace at open.

use std::path::Path;
use std::sync::Mutex;

use fjall::{Database, Keyspace, KeyspaceCreateOptions, PersistMode};
use skerry_types::{Address, Meta, SHARD_COUNT};
use tracing::debug;

use crate::error::MetaError;
use crate::traits::{MetaStore, ShardSlot, slots_view};

/// Persistent [`MetaStore`] backed by Fjall keyspaces.
pub struct FjallMetaStore {
    db: Database,
    chunks: Keyspace,
    free: Keyspace,
    slots: Mutex<Vec<i64>>,
}

impl FjallMetaStore {
    /// Open a metadata store at the given path, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetaError> {
        let db = Database::builder(path).open()?;
        Self::init(db)
    }

    /// Open a temporary metadata store (cleaned up on drop).
    pub fn open_temporary() -> Result<Self, MetaError> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.keep()).temporary(true).open()?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, MetaError> {
        let chunks = db.keyspace("chunks", KeyspaceCreateOptions::default)?;
        let free = db.keyspace("free", KeyspaceCreateOptions::default)?;

        // Rebuild the in-memory counters from the persisted free set.
        let mut slots = vec![0i64; SHARD_COUNT as usize];
        for guard in free.iter() {
            let key = guard.key()?;
            let shard = *key
                .first()
                .ok_or_else(|| MetaError::Corrupt("empty free key".to_string()))?;
            if let Some(count) = slots.get_mut(shard as usize) {
                *count += 1;
            }
        }

        Ok(Self {
            db,
            chunks,
            free,
            slots: Mutex::new(slots),
        })
    }

    /// Apply a raw delta to a shard's free-slot counter (for testing).
    #[cfg(test)]
    pub(crate) fn adjust_free_slots(&self, shard: u8, delta: i64) {
        let mut slots = self.slots.lock().expect("slot counters lock poisoned");
        slots[shard as usize] += delta;
    }
}

impl MetaStore for FjallMetaStore {
    fn get(&self, addr: &Address) -> Result<Meta, MetaError> {
        match self.chunks.get(addr.as_bytes())? {
            Some(bytes) => Ok(postcard::from_bytes(&bytes)?),
            None => Err(MetaError::NotFound(addr.clone())),
        }
    }

    fn set(
        &self,
        addr: &Address,
        shard: u8,
        reclaimed: bool,
        meta: Meta,
    ) -> Result<Option<u64>, MetaError> {
        let previous = match self.chunks.get(addr.as_bytes())? {
            Some(bytes) => Some(postcard::from_bytes::<Meta>(&bytes)?),
            None => None,
        };

        let value = postcard::to_allocvec(&meta)?;
        self.chunks.insert(addr.as_bytes(), value.as_slice())?;

        let mut slots = self.slots.lock().expect("slot counters lock poisoned");
        if reclaimed {
            self.free.remove(free_key(shard, meta.offset))?;
            slots[shard as usize] -= 1;
        }

        let displaced = previous.map(|p| p.offset).filter(|&old| old != meta.offset);
        if let Some(old) = displaced {
            self.free.insert(free_key(shard, old), b"")?;
            slots[shard as usize] += 1;
            debug!(address = %addr, shard, offset = old, "released replaced slot");
        }
        Ok(displaced)
    }

    fn remove(&self, addr: &Address, shard: u8) -> Result<(), MetaError> {
        let meta = self.get(addr)?;
        self.chunks.remove(addr.as_bytes())?;
        self.free.insert(free_key(shard, meta.offset), b"")?;

        let mut slots = self.slots.lock().expect("slot counters lock poisoned");
        slots[shard as usize] += 1;
        debug!(address = %addr, shard, offset = meta.offset, "removed chunk record");
        Ok(())
    }

    fn count(&self) -> Result<usize, MetaError> {
        // O(n) scan; chunk populations are bounded by the shard files.
        let mut count = 0;
        for guard in self.chunks.iter() {
            let _ = guard.key()?;
            count += 1;
        }
        Ok(count)
    }

    fn free_offset(&self, shard: u8) -> Result<Option<u64>, MetaError> {
        match self.free.prefix([shard]).next() {
            Some(guard) => {
                let key = guard.key()?;
                Ok(Some(offset_from_free_key(&key)?))
            }
            None => Ok(None),
        }
    }

    fn iterate(&self, f: &mut dyn FnMut(Address, Meta) -> bool) -> Result<(), MetaError> {
        for guard in self.chunks.iter() {
            let (key, value) = guard.into_inner()?;
            let addr = Address::from(&key[..]);
            let meta: Meta = postcard::from_bytes(&value)?;
            if f(addr, meta) {
                break;
            }
        }
        Ok(())
    }

    fn shard_slots(&self, sorted: bool) -> Vec<ShardSlot> {
        let slots = self.slots.lock().expect("slot counters lock poisoned");
        slots_view(&slots, sorted)
    }

    fn close(&self) -> Result<(), MetaError> {
        self.db.persist(PersistMode::SyncAll)?;
        debug!("metadata store persisted");
        Ok(())
    }
}

/// Build the `free` keyspace key: `shard byte ++ offset (big-endian)`.
fn free_key(shard: u8, offset: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = shard;
    key[1..].copy_from_slice(&offset.to_be_bytes());
    key
}

/// Decode the offset half of a `free` keyspace key.
fn offset_from_free_key(key: &[u8]) -> Result<u64, MetaError> {
    let bytes: [u8; 8] = key
        .get(1..9)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            MetaError::Corrupt(format!("free key expected 9 bytes, got {}", key.len()))
        })?;
    Ok(u64::from_be_bytes(bytes))
}
