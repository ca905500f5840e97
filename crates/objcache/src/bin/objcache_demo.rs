//! Object cache demo binary
//!
//! Drives the caches the way the interpreter does at runtime: create one
//! cache per object kind, run an acquire/release workload, purge under
//! simulated memory pressure, then delete and report allocator balance.

use std::sync::Arc;

use anyhow::Result;
use objcache::{CacheConfig, CacheRegistry, CountingAllocator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PARSE_NODE_SIZE: u16 = 48;
const PARSE_CACHE_DEPTH: u16 = 96;
const NAMESPACE_NODE_SIZE: u16 = 40;
const NAMESPACE_CACHE_DEPTH: u16 = 32;
const WORKLOAD_ROUNDS: usize = 1000;

fn main() -> Result<()> {
    init_tracing();

    info!("Starting object cache demo v{}", env!("CARGO_PKG_VERSION"));

    let alloc = Arc::new(CountingAllocator::system());
    let registry = CacheRegistry::with_allocator(alloc.clone());

    let parse_cache = registry.create(CacheConfig::new(
        "parse-node",
        PARSE_NODE_SIZE,
        PARSE_CACHE_DEPTH,
    ))?;
    let namespace_cache = registry.create(CacheConfig::new(
        "namespace-node",
        NAMESPACE_NODE_SIZE,
        NAMESPACE_CACHE_DEPTH,
    ))?;

    // Interpreter-shaped workload: bursts of short-lived parse nodes with
    // a smaller population of longer-lived namespace nodes.
    for round in 0..WORKLOAD_ROUNDS {
        let mut parse_nodes = Vec::with_capacity(8);
        for _ in 0..8 {
            parse_nodes.push(registry.acquire(parse_cache)?);
        }
        let namespace_node = registry.acquire(namespace_cache)?;

        for node in parse_nodes {
            registry.release(parse_cache, node)?;
        }
        registry.release(namespace_cache, namespace_node)?;

        if round == WORKLOAD_ROUNDS / 2 {
            info!("Simulating memory pressure at round {}", round);
            registry.purge_all();
        }
    }

    let parse_stats = registry.stats(parse_cache)?;
    let namespace_stats = registry.stats(namespace_cache)?;
    for (label, stats) in [("parse-node", parse_stats), ("namespace-node", namespace_stats)] {
        info!(
            "Cache '{}': {} requests, {} hits ({:.1}% hit rate), depth {}/{}",
            label,
            stats.requests,
            stats.hits,
            stats.hit_rate() * 100.0,
            stats.depth,
            stats.max_depth
        );
    }

    registry.delete(parse_cache)?;
    registry.delete(namespace_cache)?;
    drop(registry);

    let alloc_stats = alloc.stats();
    info!(
        "Host allocator: {} allocations, {} frees, {} bytes outstanding",
        alloc_stats.allocations, alloc_stats.frees, alloc_stats.outstanding_bytes
    );

    // Machine-readable summary for downstream tooling
    let summary = serde_json::json!({
        "parse_node": parse_stats,
        "namespace_node": namespace_stats,
        "allocator": alloc_stats,
    });
    info!("Run summary: {}", serde_json::to_string_pretty(&summary)?);

    anyhow::ensure!(
        alloc_stats.is_balanced(),
        "allocator left unbalanced after shutdown"
    );

    info!("Object cache demo finished");
    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "objcache=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
