//! Handle registry tests
//!
//! Generation-checked handle resolution, slot reuse, and rejection of
//! objects released into the wrong cache.

use objcache::{CacheConfig, CacheError};

use crate::common::counting_registry;
use crate::init_test_logging;
use crate::test_config::{TEST_MAX_DEPTH, TEST_OBJECT_SIZE};

#[test]
fn test_stale_handle_rejected_by_every_operation() {
    init_test_logging();

    let (_alloc, registry) = counting_registry();
    let id = registry
        .create(CacheConfig::new("stale", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    let obj = registry.acquire(id).expect("Failed to acquire object");

    registry.delete(id).expect("Failed to delete cache");

    assert!(matches!(registry.acquire(id), Err(CacheError::StaleHandle { .. })));
    assert!(matches!(registry.stats(id), Err(CacheError::StaleHandle { .. })));
    assert!(matches!(registry.purge(id), Err(CacheError::StaleHandle { .. })));
    assert!(matches!(registry.delete(id), Err(CacheError::StaleHandle { .. })));
    assert!(matches!(
        registry.release(id, obj),
        Err(CacheError::StaleHandle { .. })
    ));
}

#[cfg(debug_assertions)]
#[test]
fn test_stale_handle_rejected_by_validate() {
    init_test_logging();

    let (_alloc, registry) = counting_registry();
    let id = registry
        .create(CacheConfig::new("stale", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    registry.delete(id).expect("Failed to delete cache");

    assert!(matches!(registry.validate(id), Err(CacheError::StaleHandle { .. })));
}

#[test]
fn test_slot_reuse_does_not_revive_old_handle() {
    init_test_logging();

    let (_alloc, registry) = counting_registry();
    let old = registry
        .create(CacheConfig::new("first", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    registry.delete(old).expect("Failed to delete cache");

    let new = registry
        .create(CacheConfig::new("second", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create replacement cache");

    assert_eq!(new.index(), old.index(), "The vacated slot should be reused");
    assert_ne!(new.generation(), old.generation());
    assert!(matches!(registry.acquire(old), Err(CacheError::StaleHandle { .. })));
    assert!(registry.acquire(new).is_ok());
}

#[test]
fn test_foreign_object_release_rejected() {
    init_test_logging();

    let (alloc, registry) = counting_registry();
    let parse = registry
        .create(CacheConfig::new("parse", 48, TEST_MAX_DEPTH))
        .expect("Failed to create parse cache");
    let node = registry
        .create(CacheConfig::new("node", 48, TEST_MAX_DEPTH))
        .expect("Failed to create node cache");

    let obj = registry.acquire(parse).expect("Failed to acquire object");
    let err = registry
        .release(node, obj)
        .expect_err("Cross-cache release must be rejected");
    assert!(matches!(err, CacheError::ForeignObject { .. }));

    // The wrong cache is untouched and the rejected object went back to
    // the host rather than leaking
    let node_stats = registry.stats(node).expect("Failed to read stats");
    assert_eq!(node_stats.depth, 0);
    assert_eq!(node_stats.requests, 0);
    assert_eq!(alloc.stats().frees, 1);

    let parse_stats = registry.stats(parse).expect("Failed to read stats");
    assert_eq!(parse_stats.requests, 1);
    assert_eq!(parse_stats.depth, 0);
}

#[test]
fn test_handles_format_compactly() {
    let (_alloc, registry) = counting_registry();
    let id = registry
        .create(CacheConfig::new("fmt", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");

    assert_eq!(format!("{id}"), format!("C{}", id.index()));
    assert_eq!(format!("{id:?}"), format!("CacheId({}:{})", id.index(), id.generation()));
}

#[test]
fn test_registry_tracks_live_cache_count() {
    init_test_logging();

    let (_alloc, registry) = counting_registry();
    assert!(registry.is_empty());

    let a = registry
        .create(CacheConfig::new("a", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    let b = registry
        .create(CacheConfig::new("b", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    assert_eq!(registry.len(), 2);

    registry.delete(a).expect("Failed to delete cache");
    assert_eq!(registry.len(), 1);

    // Slot reuse keeps the count accurate
    let c = registry
        .create(CacheConfig::new("c", TEST_OBJECT_SIZE, TEST_MAX_DEPTH))
        .expect("Failed to create cache");
    assert_eq!(registry.len(), 2);

    registry.delete(b).expect("Failed to delete cache");
    registry.delete(c).expect("Failed to delete cache");
    assert!(registry.is_empty());
}

#[test]
fn test_purge_all_drains_every_cache() {
    init_test_logging();

    let (alloc, registry) = counting_registry();
    let ids: Vec<_> = (0..3)
        .map(|i| {
            registry
                .create(CacheConfig::new(format!("cache-{i}"), 32, TEST_MAX_DEPTH))
                .expect("Failed to create cache")
        })
        .collect();

    for &id in &ids {
        let obj = registry.acquire(id).expect("Failed to acquire object");
        registry.release(id, obj).expect("Failed to release object");
    }

    registry.purge_all();

    for &id in &ids {
        assert_eq!(registry.stats(id).expect("Failed to read stats").depth, 0);
    }
    assert!(alloc.stats().is_balanced());
}
