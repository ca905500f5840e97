//! Object Cache Error Types
//!
//! Specific error types for production-grade error handling

use thiserror::Error;

use crate::registry::CacheId;

/// Object cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache name is empty
    #[error("Cache name is empty")]
    EmptyName,

    /// Object size is zero
    #[error("Object size must be non-zero")]
    ZeroObjectSize,

    /// Handle refers to a deleted or never-created cache
    #[error("Stale cache handle: {id:?}")]
    StaleHandle { id: CacheId },

    /// Object released into a cache it was not acquired from
    #[error("Object does not belong to cache '{name}'")]
    ForeignObject { name: String },

    /// Host allocator exhausted
    #[error("Host allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },

    /// Free list walk disagrees with the recorded depth
    #[error("Cache '{name}' corrupted: recorded depth {recorded}, walked {walked}")]
    Corruption {
        name: String,
        recorded: u16,
        walked: u16,
    },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
