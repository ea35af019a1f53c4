//! Shared types for Skerry.
//!
//! This crate defines the core types used across the Skerry workspace:
//! the chunk [`Address`], the [`Chunk`] itself, the location record
//! [`Meta`] persisted by the metadata store, and the shard layout
//! constants.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Number of shard files a store is partitioned into.
pub const SHARD_COUNT: u8 = 32;

/// Opaque chunk address.
///
/// Addresses are produced by a higher layer (content addressing is out of
/// scope here) and treated as plain bytes. They must be at least one byte
/// long; the last byte selects the shard a chunk lands in.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Bytes);

impl Address {
    /// Create an address from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Return the raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Shard this address maps to: the last address byte mod [`SHARD_COUNT`].
    pub fn shard(&self) -> u8 {
        self.0.last().copied().unwrap_or(0) % SHARD_COUNT
    }
}

impl From<Vec<u8>> for Address {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Address {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// An addressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk's address.
    pub address: Address,
    /// The payload bytes. At most the store's configured maximum chunk size.
    pub data: Bytes,
}

impl Chunk {
    /// Create a chunk from an address and payload bytes.
    pub fn new(address: Address, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }
}

/// Location record for a stored chunk.
///
/// `offset` points at the start of the chunk's section within its shard
/// file and is always a multiple of the store's maximum chunk size.
/// `size` is the true payload length; the rest of the section is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// True payload length in bytes.
    pub size: u16,
    /// Byte offset of the section within the shard file.
    pub offset: u64,
}
