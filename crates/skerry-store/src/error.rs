//! Error types for chunk store operations.

use skerry_meta::MetaError;
use skerry_types::Address;

/// Errors that can occur during chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store has been closed; no further operations are possible.
    #[error("store is closed")]
    Closed,

    /// The requested chunk was not found.
    #[error("chunk not found: {0}")]
    NotFound(Address),

    /// The payload does not fit in one section.
    #[error("chunk data exceeds maximum size: {size} > {max}")]
    ChunkTooLarge {
        /// Payload length in bytes.
        size: usize,
        /// Configured maximum chunk size.
        max: usize,
    },

    /// The configured maximum chunk size is outside the supported range.
    #[error("invalid maximum chunk size: {0}")]
    InvalidMaxChunkSize(usize),

    /// A shard file returned fewer bytes than the metadata store recorded.
    /// Indicates divergence between the shard file and its metadata.
    #[error("incomplete chunk data, read {read} of {expected}")]
    IncompleteData {
        /// Bytes actually read.
        read: usize,
        /// Bytes the metadata store recorded.
        expected: usize,
    },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata store failed.
    #[error("metadata store error: {0}")]
    Meta(#[source] MetaError),
}

impl From<MetaError> for StoreError {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::NotFound(addr) => StoreError::NotFound(addr),
            other => StoreError::Meta(other),
        }
    }
}
