//! Fixed-size sharded chunk store.
//!
//! Chunks are partitioned across [`SHARD_COUNT`](skerry_types::SHARD_COUNT)
//! files by the last byte of their address. Every chunk occupies one
//! fixed-size section of its shard file, so any slot can host any chunk:
//! deleting a chunk frees its section for reuse by a later write. Offsets
//! and free slots are tracked by an injected
//! [`MetaStore`](skerry_meta::MetaStore); a small in-memory
//! [`OffsetCache`](crate::free_cache::OffsetCache) keeps hot reclaimable
//! offsets out of the metadata store's way.
//!
//! The public surface is the [`ChunkStore`] trait, implemented by
//! [`Store`].

mod error;
mod free_cache;
mod gate;
mod store;
mod traits;

pub use error::StoreError;
pub use store::{Store, StoreConfig};
pub use traits::ChunkStore;
