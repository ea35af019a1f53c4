//! The metadata-store contract.

use skerry_types::{Address, Meta};

use crate::MetaError;

/// One row of the per-shard free-slot view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSlot {
    /// Shard id.
    pub shard: u8,
    /// Current free-slot count for the shard.
    pub slots: i64,
}

/// Persistent address → location index with free-slot bookkeeping.
///
/// Implementations must be `Send + Sync`; the chunk store calls them from
/// many threads, always holding the relevant shard lock for mutations, so
/// a backend only needs to make each individual operation atomic.
pub trait MetaStore: Send + Sync {
    /// Look up the location record for an address.
    ///
    /// Fails with [`MetaError::NotFound`] when no record exists.
    fn get(&self, addr: &Address) -> Result<Meta, MetaError>;

    /// Insert or replace the record for an address.
    ///
    /// When `reclaimed` is true the written offset was taken from the
    /// shard's free set: the free entry is dropped and the shard's
    /// free-slot counter decremented.
    ///
    /// When the upsert replaces a record that lived at a *different*
    /// offset, the old offset joins the free set (counter incremented) and
    /// is returned so the caller can update its own free-slot hints.
    fn set(
        &self,
        addr: &Address,
        shard: u8,
        reclaimed: bool,
        meta: Meta,
    ) -> Result<Option<u64>, MetaError>;

    /// Delete the record for an address, returning its offset to the
    /// shard's free set and incrementing the free-slot counter.
    ///
    /// Fails with [`MetaError::NotFound`] when no record exists.
    fn remove(&self, addr: &Address, shard: u8) -> Result<(), MetaError>;

    /// Number of stored records.
    fn count(&self) -> Result<usize, MetaError>;

    /// Peek some reclaimable offset for a shard, or `None` if the shard
    /// has no free slots.
    ///
    /// The offset is not consumed; the subsequent [`set`](Self::set) with
    /// `reclaimed = true` consumes it.
    fn free_offset(&self, shard: u8) -> Result<Option<u64>, MetaError>;

    /// Visit every record exactly once, in unspecified order.
    ///
    /// Iteration stops early when `f` returns `true`.
    fn iterate(&self, f: &mut dyn FnMut(Address, Meta) -> bool) -> Result<(), MetaError>;

    /// Per-shard free-slot counts.
    ///
    /// In shard-id order when `sorted` is false; in descending slot count
    /// (ties broken by ascending shard id) when `sorted` is true.
    fn shard_slots(&self, sorted: bool) -> Vec<ShardSlot>;

    /// Flush state. Idempotent.
    fn close(&self) -> Result<(), MetaError>;
}

/// Build the [`ShardSlot`] view over raw per-shard counters.
pub(crate) fn slots_view(slots: &[i64], sorted: bool) -> Vec<ShardSlot> {
    let mut view: Vec<ShardSlot> = slots
        .iter()
        .enumerate()
        .map(|(shard, &slots)| ShardSlot {
            shard: shard as u8,
            slots,
        })
        .collect();
    if sorted {
        view.sort_by(|a, b| b.slots.cmp(&a.slots).then(a.shard.cmp(&b.shard)));
    }
    view
}
