//! The chunk store capability trait.

use skerry_types::{Address, Chunk};

use crate::error::StoreError;

/// Operations every chunk store implementation provides.
///
/// All methods are safe to call concurrently. Once [`close`](Self::close)
/// has begun, every method fails with [`StoreError::Closed`].
pub trait ChunkStore: Send + Sync {
    /// Retrieve a chunk's payload by address.
    fn get(&self, addr: &Address) -> Result<Chunk, StoreError>;

    /// Whether a chunk is stored under the address.
    fn has(&self, addr: &Address) -> Result<bool, StoreError>;

    /// Store a chunk. Idempotent per address: a repeated put replaces the
    /// previous payload.
    fn put(&self, chunk: &Chunk) -> Result<(), StoreError>;

    /// Delete a chunk, returning its slot to the shard's free pool.
    fn delete(&self, addr: &Address) -> Result<(), StoreError>;

    /// Number of stored chunks.
    fn count(&self) -> Result<usize, StoreError>;

    /// Visit every stored chunk exactly once, in no particular order.
    ///
    /// Iteration stops early when `f` returns `Ok(true)` or an error; the
    /// error is propagated to the caller. Writers block for the duration.
    fn iterate(
        &self,
        f: &mut dyn FnMut(Chunk) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError>;

    /// Drain in-flight operations and release the store's resources.
    /// Idempotent; afterwards every operation fails with
    /// [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError>;
}
