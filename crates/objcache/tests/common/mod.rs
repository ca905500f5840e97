//! Shared helpers for the object cache test suite

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use objcache::{CacheRegistry, CountingAllocator, HostAllocator};

/// Host allocator that serves a fixed number of allocations and then
/// reports exhaustion, for driving out-of-memory recovery paths.
pub struct FailingAllocator {
    budget: AtomicUsize,
}

impl FailingAllocator {
    /// Create an allocator that succeeds `budget` times and fails afterwards
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: AtomicUsize::new(budget),
        }
    }

    /// Grant additional allocations
    pub fn refill(&self, additional: usize) {
        self.budget.fetch_add(additional, Ordering::Relaxed);
    }

    /// Remaining allocation budget
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.budget.load(Ordering::Relaxed)
    }
}

impl HostAllocator for FailingAllocator {
    fn allocate_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
        self.budget
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| b.checked_sub(1))
            .ok()?;
        Some(vec![0_u8; size].into_boxed_slice())
    }

    fn free(&self, buffer: Box<[u8]>) {
        drop(buffer);
    }
}

/// Build a registry backed by a counting allocator so tests can assert
/// allocation/free balance after teardown
#[must_use]
pub fn counting_registry() -> (Arc<CountingAllocator>, CacheRegistry) {
    let alloc = Arc::new(CountingAllocator::system());
    let registry = CacheRegistry::with_allocator(alloc.clone());
    (alloc, registry)
}
