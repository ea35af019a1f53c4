//! Error types for the metadata store.

use skerry_types::Address;

/// Errors returned by [`MetaStore`](crate::MetaStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// No record exists for the given address.
    #[error("chunk not found: {0}")]
    NotFound(Address),

    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// A stored key or value does not have the expected shape.
    #[error("corrupt metadata: {0}")]
    Corrupt(String),
}
