//! Object cache configuration

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Maximum stored length of a cache name in bytes. Longer names are
/// truncated on a character boundary when the cache is created.
pub const CACHE_NAME_MAX: usize = 15;

/// Configuration for one cache instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Display name used in diagnostics
    pub name: String,

    /// Fixed size of every pooled object in bytes
    pub object_size: u16,

    /// Maximum number of idle objects kept on the free list
    pub max_depth: u16,
}

impl CacheConfig {
    /// Creates a configuration with the given name, object size, and depth bound.
    pub fn new(name: impl Into<String>, object_size: u16, max_depth: u16) -> Self {
        Self {
            name: name.into(),
            object_size,
            max_depth,
        }
    }

    /// Checks the create-time parameter constraints.
    pub fn validate(&self) -> CacheResult<()> {
        if self.name.is_empty() {
            return Err(CacheError::EmptyName);
        }
        if self.object_size == 0 {
            return Err(CacheError::ZeroObjectSize);
        }
        Ok(())
    }

    /// Name as stored on the cache: at most `CACHE_NAME_MAX` bytes, never
    /// split inside a multi-byte character.
    pub(crate) fn stored_name(&self) -> String {
        let mut end = self.name.len().min(CACHE_NAME_MAX);
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        self.name[..end].to_string()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        const DEFAULT_OBJECT_SIZE: u16 = 64;
        const DEFAULT_MAX_DEPTH: u16 = 96;

        Self {
            name: "object".to_string(),
            object_size: DEFAULT_OBJECT_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
