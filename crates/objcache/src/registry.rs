//! Cache lifecycle management
//!
//! The registry owns every cache instance and hands out generation-checked
//! handles. Deleting a cache bumps its slot generation, so a stale handle
//! can never be mistaken for a live one, even after the slot is reused for
//! a new cache. Lifecycle operations take the registry lock briefly and
//! never hold it across host allocator calls.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

#[cfg(debug_assertions)]
use crate::cache::ValidationReport;
use crate::cache::{CacheStats, ObjectCache, PooledObject};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::host::{HostAllocator, SystemAllocator};

/// Handle to a cache instance owned by a [`CacheRegistry`].
///
/// Handles are plain copyable values; once the cache is deleted every copy
/// becomes permanently invalid.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId {
    index: u32,
    generation: u32,
}

impl CacheId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the registry table.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for CacheId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheId({}:{})", self.index, self.generation)
    }
}

impl fmt::Display for CacheId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.index)
    }
}

/// One entry of the registry table.
struct Slot {
    generation: u32,
    cache: Option<Arc<ObjectCache>>,
}

/// Owner of all cache instances.
///
/// The slot table is guarded by an ordinary read/write lock; lifecycle
/// operations are not hot-path and never run from contexts that cannot
/// sleep. Handle resolution clones the instance `Arc` and drops the table
/// lock before touching the cache itself.
pub struct CacheRegistry {
    slots: RwLock<Vec<Slot>>,
    alloc: Arc<dyn HostAllocator>,
}

impl CacheRegistry {
    /// Registry backed by the process heap.
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(SystemAllocator))
    }

    /// Registry backed by a caller-provided host allocator.
    pub fn with_allocator(alloc: Arc<dyn HostAllocator>) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            alloc,
        }
    }

    /// Creates a cache and returns its handle.
    ///
    /// Fails if the configured name is empty or the object size is zero.
    pub fn create(&self, config: CacheConfig) -> CacheResult<CacheId> {
        let cache = Arc::new(ObjectCache::new(config, Arc::clone(&self.alloc))?);

        let mut slots = self.slots.write();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.cache.is_none() {
                slot.cache = Some(cache);
                // SAFETY: slot count stays far below u32::MAX
                return Ok(CacheId::new(index as u32, slot.generation));
            }
        }

        slots.push(Slot {
            generation: 1,
            cache: Some(cache),
        });
        // SAFETY: slot count stays far below u32::MAX
        Ok(CacheId::new((slots.len() - 1) as u32, 1))
    }

    /// Deletes a cache, invalidating every copy of its handle.
    ///
    /// The free list is drained back to the host after the handle is
    /// already dead, so no new work can reach the instance through the
    /// registry. Callers still holding the instance through an in-flight
    /// operation finish safely; objects they release afterwards are freed
    /// when the last reference drops.
    pub fn delete(&self, id: CacheId) -> CacheResult<()> {
        let cache = {
            let mut slots = self.slots.write();
            let slot = slots
                .get_mut(id.index() as usize)
                .filter(|slot| slot.generation == id.generation())
                .ok_or(CacheError::StaleHandle { id })?;
            let cache = slot.cache.take().ok_or(CacheError::StaleHandle { id })?;
            slot.generation = slot.generation.wrapping_add(1);
            cache
        };

        let stats = cache.stats();
        debug!(
            "Deleting object cache '{}': {} requests, {} hits ({:.1}% hit rate)",
            cache.name(),
            stats.requests,
            stats.hits,
            stats.hit_rate() * 100.0
        );
        cache.purge();
        Ok(())
    }

    /// Frees all idle objects of one cache; the cache stays usable.
    pub fn purge(&self, id: CacheId) -> CacheResult<()> {
        self.resolve(id)?.purge();
        Ok(())
    }

    /// Frees the idle objects of every live cache.
    ///
    /// Memory-pressure helper for the surrounding runtime; outstanding
    /// objects in caller hands are untouched.
    pub fn purge_all(&self) {
        let caches: Vec<Arc<ObjectCache>> = {
            let slots = self.slots.read();
            slots
                .iter()
                .filter_map(|slot| slot.cache.as_ref().map(Arc::clone))
                .collect()
        };
        for cache in caches {
            cache.purge();
        }
    }

    /// Acquires a zeroed object from the cache behind `id`.
    pub fn acquire(&self, id: CacheId) -> CacheResult<PooledObject> {
        self.resolve(id)?.acquire()
    }

    /// Releases an object back to the cache behind `id`.
    ///
    /// A stale handle is rejected without touching any pool state; the
    /// rejected object frees its buffer through its own drop.
    pub fn release(&self, id: CacheId, obj: PooledObject) -> CacheResult<()> {
        self.resolve(id)?.release(obj)
    }

    /// Counter snapshot for the cache behind `id`.
    pub fn stats(&self, id: CacheId) -> CacheResult<CacheStats> {
        Ok(self.resolve(id)?.stats())
    }

    /// Runs the free list validator for the cache behind `id`.
    #[cfg(debug_assertions)]
    pub fn validate(&self, id: CacheId) -> CacheResult<ValidationReport> {
        self.resolve(id)?.validate()
    }

    /// Number of live caches.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.cache.is_some())
            .count()
    }

    /// True when no caches are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, id: CacheId) -> CacheResult<Arc<ObjectCache>> {
        let slots = self.slots.read();
        let slot = slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .ok_or(CacheError::StaleHandle { id })?;
        slot.cache
            .as_ref()
            .map(Arc::clone)
            .ok_or(CacheError::StaleHandle { id })
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CacheRegistry {
    fn drop(&mut self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let slots = self.slots.get_mut();
        for slot in slots.iter() {
            if let Some(cache) = &slot.cache {
                warn!(
                    "Object cache '{}' never deleted (depth {} at shutdown)",
                    cache.name(),
                    cache.depth()
                );
            }
        }
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("live_caches", &self.len())
            .finish()
    }
}
