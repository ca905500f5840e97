//! Fixed-size object caching for the interpreter runtime
//!
//! The interpreter creates and destroys small fixed-size objects (parse
//! nodes, namespace entries) at very high frequency while evaluating
//! bytecode. These caches keep released objects on a per-instance LIFO
//! free list so the hot path can skip the host allocator entirely:
//! - Generation-checked handles for cache lifecycle management
//! - Spin-based locking usable from contexts that must never sleep
//! - Zeroed payloads on every acquire, from the pool or freshly allocated
//! - Hit/request counters and a debug-build free list validator
//!
//! Host allocation never happens under a cache lock. The spin lock itself
//! never sleeps, but an acquire that misses the free list calls into the
//! host allocator, which may.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod spinlock;

#[cfg(debug_assertions)]
pub use cache::ValidationReport;
pub use cache::{CacheStats, ObjectCache, PooledObject};
pub use config::{CACHE_NAME_MAX, CacheConfig};
pub use error::{CacheError, CacheResult};
pub use host::{AllocationStats, CountingAllocator, HostAllocator, SystemAllocator};
pub use registry::{CacheId, CacheRegistry};
