//! Host allocator seam
//!
//! The interpreter runtime sits above a host environment that owns the real
//! allocator. Every buffer the caches hand out or reclaim crosses this trait,
//! so embedders can substitute instrumented implementations without touching
//! the cache engine.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Raw allocation primitive provided by the host environment.
///
/// Implementations must be callable from multiple threads; the caches invoke
/// them outside their own locks.
pub trait HostAllocator: Send + Sync {
    /// Allocates a zero-initialized buffer of `size` bytes.
    ///
    /// Returns `None` when the host is out of memory.
    fn allocate_zeroed(&self, size: usize) -> Option<Box<[u8]>>;

    /// Returns a buffer to the host.
    fn free(&self, buf: Box<[u8]>);
}

/// Production allocator forwarding to the process heap.
#[derive(Debug, Default)]
pub struct SystemAllocator;

impl HostAllocator for SystemAllocator {
    fn allocate_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
        Some(vec![0_u8; size].into_boxed_slice())
    }

    fn free(&self, buf: Box<[u8]>) {
        drop(buf);
    }
}

/// Snapshot of the counters kept by a [`CountingAllocator`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AllocationStats {
    /// Buffers handed out
    pub allocations: u64,
    /// Buffers returned
    pub frees: u64,
    /// Bytes currently allocated and not yet freed
    pub outstanding_bytes: usize,
}

impl AllocationStats {
    /// True when every allocation has been returned.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.frees && self.outstanding_bytes == 0
    }
}

/// Decorator that counts traffic through an inner allocator.
///
/// Used by tests to prove drains are balanced and by embedders that want
/// leak diagnostics at shutdown.
pub struct CountingAllocator {
    inner: Arc<dyn HostAllocator>,
    allocations: AtomicU64,
    frees: AtomicU64,
    outstanding_bytes: AtomicUsize,
}

impl CountingAllocator {
    /// Wraps an existing allocator.
    pub fn new(inner: Arc<dyn HostAllocator>) -> Self {
        Self {
            inner,
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            outstanding_bytes: AtomicUsize::new(0),
        }
    }

    /// Counting wrapper over the process heap.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemAllocator))
    }

    /// Current counter snapshot.
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            outstanding_bytes: self.outstanding_bytes.load(Ordering::Relaxed),
        }
    }

    /// Bytes allocated through this wrapper and not yet freed.
    #[inline]
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.load(Ordering::Relaxed)
    }
}

impl HostAllocator for CountingAllocator {
    fn allocate_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
        let buf = self.inner.allocate_zeroed(size)?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.outstanding_bytes.fetch_add(buf.len(), Ordering::Relaxed);
        Some(buf)
    }

    fn free(&self, buf: Box<[u8]>) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.outstanding_bytes.fetch_sub(buf.len(), Ordering::Relaxed);
        self.inner.free(buf);
    }
}

impl fmt::Debug for CountingAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingAllocator")
            .field("stats", &self.stats())
            .finish()
    }
}
