//! Acquire/release engine for fixed-size object caches
//!
//! Performance characteristics:
//! - Acquire hit: O(1) pop under a spin lock, zeroing outside the lock
//! - Acquire miss: host allocation outside the lock
//! - Release: O(1) push, or a host free outside the lock at the depth cap
//! - Free list storage is reserved up front, so no allocation ever happens
//!   inside a critical section

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::host::HostAllocator;
use crate::spinlock::SpinLock;

/// Source of per-instance provenance tokens.
static CACHE_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mutable cache state guarded by the spin lock.
///
/// `depth` is recorded alongside the stack deliberately: the cap policy
/// reads the counter, the validator walks the stack, and a disagreement
/// between the two is how free-list damage gets detected.
struct FreeList {
    /// Idle buffers, most recently released on top
    slots: Vec<Box<[u8]>>,
    /// Recorded number of idle buffers
    depth: u16,
    /// Total acquire calls
    requests: u32,
    /// Acquires satisfied from the free list
    hits: u32,
}

/// A fixed-size object cache with a LIFO free list.
///
/// The interpreter creates one instance per object kind and then acquires
/// and releases objects on its hot path. Released objects are kept on the
/// free list up to `max_depth`; excess objects go back to the host
/// allocator. Objects are created lazily, so a cache holds no buffers
/// until the first acquire.
pub struct ObjectCache {
    name: String,
    object_size: u16,
    max_depth: u16,
    /// Provenance token carried by every object this cache hands out
    token: u64,
    free: SpinLock<FreeList>,
    alloc: Arc<dyn HostAllocator>,
}

impl ObjectCache {
    /// Creates an empty cache from a validated configuration.
    pub fn new(config: CacheConfig, alloc: Arc<dyn HostAllocator>) -> CacheResult<Self> {
        config.validate()?;
        let name = config.stored_name();
        debug!(
            "Created object cache '{}' (object_size={}, max_depth={})",
            name, config.object_size, config.max_depth
        );

        Ok(Self {
            name,
            object_size: config.object_size,
            max_depth: config.max_depth,
            token: CACHE_TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed),
            free: SpinLock::new(FreeList {
                slots: Vec::with_capacity(usize::from(config.max_depth)),
                depth: 0,
                requests: 0,
                hits: 0,
            }),
            alloc,
        })
    }

    /// Hands out a zeroed object, reusing the free list when possible.
    ///
    /// The object is fully zeroed on every path, whether it was popped from
    /// the free list or freshly allocated.
    pub fn acquire(&self) -> CacheResult<PooledObject> {
        let popped = {
            let mut list = self.free.lock();
            list.requests = list.requests.saturating_add(1);
            match list.slots.pop() {
                Some(buf) => {
                    list.depth = list.depth.saturating_sub(1);
                    list.hits = list.hits.saturating_add(1);
                    Some(buf)
                }
                None => None,
            }
        };

        let buf = match popped {
            Some(mut buf) => {
                buf.fill(0);
                buf
            }
            None => {
                let bytes = usize::from(self.object_size);
                match self.alloc.allocate_zeroed(bytes) {
                    Some(buf) => buf,
                    None => {
                        warn!("Cache '{}': host allocation of {} bytes failed", self.name, bytes);
                        return Err(CacheError::OutOfMemory { bytes });
                    }
                }
            }
        };

        Ok(PooledObject {
            buf: Some(buf),
            token: self.token,
            alloc: Arc::clone(&self.alloc),
        })
    }

    /// Returns an object to the free list, or to the host at the depth cap.
    ///
    /// The object must have been acquired from this instance; anything else
    /// is rejected and freed through its own drop.
    pub fn release(&self, obj: PooledObject) -> CacheResult<()> {
        if obj.token() != self.token {
            return Err(CacheError::ForeignObject {
                name: self.name.clone(),
            });
        }
        let buf = obj.take_buf();

        let excess = {
            let mut list = self.free.lock();
            if list.depth >= self.max_depth {
                Some(buf)
            } else {
                list.depth = list.depth.saturating_add(1);
                list.slots.push(buf);
                None
            }
        };

        if let Some(buf) = excess {
            self.alloc.free(buf);
        }
        Ok(())
    }

    /// Frees every idle object and leaves the cache empty but usable.
    ///
    /// Only pointer moves happen under the lock; the host frees run after
    /// the guard is dropped.
    pub fn purge(&self) {
        let mut drained = Vec::with_capacity(usize::from(self.max_depth));
        {
            let mut list = self.free.lock();
            drained.append(&mut list.slots);
            list.depth = 0;
        }

        let count = drained.len();
        for buf in drained {
            self.alloc.free(buf);
        }
        if count > 0 {
            debug!("Purged {} objects from cache '{}'", count, self.name);
        }
    }

    /// Point-in-time counter snapshot.
    pub fn stats(&self) -> CacheStats {
        let list = self.free.lock();
        CacheStats {
            requests: list.requests,
            hits: list.hits,
            depth: list.depth,
            max_depth: self.max_depth,
        }
    }

    /// Walks the free list and cross-checks it against the recorded depth.
    ///
    /// Counts the correctly sized buffers on the stack; a walked count that
    /// disagrees with the recorded depth (from a lost, duplicated, or
    /// wrong-sized entry) is reported as corruption rather than crashing.
    /// The walk is over owned buffers, so it always terminates.
    #[cfg(debug_assertions)]
    pub fn validate(&self) -> CacheResult<ValidationReport> {
        let list = self.free.lock();
        let object_size = usize::from(self.object_size);
        let walked = list
            .slots
            .iter()
            .filter(|buf| buf.len() == object_size)
            .count();
        let walked = u16::try_from(walked).unwrap_or(u16::MAX);

        if walked != list.depth {
            warn!(
                "Cache '{}' failed validation: recorded depth {}, walked {}",
                self.name, list.depth, walked
            );
            return Err(CacheError::Corruption {
                name: self.name.clone(),
                recorded: list.depth,
                walked,
            });
        }

        Ok(ValidationReport {
            name: self.name.clone(),
            depth: list.depth,
            max_depth: self.max_depth,
            requests: list.requests,
            hits: list.hits,
        })
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured object size in bytes.
    #[inline]
    pub fn object_size(&self) -> u16 {
        self.object_size
    }

    /// Configured free list bound.
    #[inline]
    pub fn max_depth(&self) -> u16 {
        self.max_depth
    }

    /// Number of idle objects currently on the free list.
    #[inline]
    pub fn depth(&self) -> u16 {
        self.free.lock().depth
    }

    #[cfg(test)]
    fn corrupt_depth(&self, depth: u16) {
        self.free.lock().depth = depth;
    }
}

impl Drop for ObjectCache {
    fn drop(&mut self) {
        // Stragglers may have released objects after a registry delete
        // drained the list; those still go back through the host.
        let list = self.free.get_mut();
        for buf in list.slots.drain(..) {
            self.alloc.free(buf);
        }
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.name)
            .field("object_size", &self.object_size)
            .field("max_depth", &self.max_depth)
            .field("stats", &self.stats())
            .finish()
    }
}

/// An owned, fixed-size payload buffer handed out by [`ObjectCache::acquire`].
///
/// Ownership of the buffer sits with the caller until the object is passed
/// back via release. Dropping the object instead returns its buffer straight
/// to the host allocator, so abandonment cannot leak.
pub struct PooledObject {
    buf: Option<Box<[u8]>>,
    token: u64,
    alloc: Arc<dyn HostAllocator>,
}

impl PooledObject {
    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, |buf| buf.len())
    }

    /// True if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the payload, stable for the lifetime of the object and
    /// usable as a reuse identity across acquire/release cycles.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ref().map_or(std::ptr::null(), |buf| buf.as_ptr())
    }

    #[inline]
    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Consumes the object, leaving nothing for its drop to free.
    pub(crate) fn take_buf(mut self) -> Box<[u8]> {
        self.buf.take().unwrap_or_default()
    }
}

impl std::ops::Deref for PooledObject {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PooledObject {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledObject {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.alloc.free(buf);
        }
    }
}

impl fmt::Debug for PooledObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("len", &self.len())
            .field("token", &self.token)
            .finish()
    }
}

/// Point-in-time counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    /// Total acquire calls
    pub requests: u32,
    /// Acquires satisfied from the free list
    pub hits: u32,
    /// Idle objects currently on the free list
    pub depth: u16,
    /// Configured free list bound
    pub max_depth: u16,
}

impl CacheStats {
    /// Fraction of requests served from the free list (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.hits) / f64::from(self.requests)
        }
    }
}

/// Snapshot produced by a successful [`ObjectCache::validate`] walk.
#[cfg(debug_assertions)]
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Cache display name
    pub name: String,
    /// Walked and recorded depth (they agree on success)
    pub depth: u16,
    /// Configured free list bound
    pub max_depth: u16,
    /// Total acquire calls
    pub requests: u32,
    /// Acquires satisfied from the free list
    pub hits: u32,
}

#[cfg(debug_assertions)]
impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache '{}': depth {}/{}, requests {}, hits {}",
            self.name, self.depth, self.max_depth, self.requests, self.hits
        )
    }
}
