//! incache demo - exercises both cache engines and reports their statistics
//!
//! Configuration comes from `CACHE_CAPACITY` and `CACHE_SWEEP_INTERVAL_MS`;
//! log verbosity from `RUST_LOG`.

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use incache::{Cache, CacheBuilder, CacheConfig};

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build one cache per engine
/// 4. Overfill both caches and add short-lived entries
/// 5. Wait past the sweep interval, then copy and transfer between engines
/// 6. Print per-engine statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::try_from_env().context("loading cache configuration")?;
    info!(
        "Configuration loaded: capacity={}, sweep_interval={:?}",
        config.capacity, config.sweep_interval
    );

    let builder = CacheBuilder::from_config(config.clone());
    let lru = builder.build_lru::<String, u64>();
    let manual = builder
        .build_manual::<String, u64>()
        .context("starting manual cache")?;

    let total = (config.capacity as u64).saturating_add(config.capacity as u64 / 2);
    for i in 0..total {
        lru.set(format!("key:{}", i), i);
        manual.set(format!("key:{}", i), i);
    }
    for i in 0..10u64 {
        let key = format!("session:{}", i);
        lru.set_with_timeout(key.clone(), i, Duration::from_millis(50));
        manual.set_with_timeout(key, i, Duration::from_millis(50));
    }
    info!(
        "Filled caches: lru len={}, manual len={}",
        lru.len(),
        manual.len()
    );

    let wait = config.sweep_interval.max(Duration::from_millis(100)) * 2;
    tokio::time::sleep(wait).await;
    info!(
        "After {:?}: lru len={} live={}, manual len={} live={}",
        wait,
        lru.len(),
        lru.count(),
        manual.len(),
        manual.count()
    );

    for i in (0..total).step_by(7) {
        let key = format!("key:{}", i);
        lru.get(&key);
        manual.get(&key);
    }

    let merged = CacheBuilder::new()
        .capacity(config.capacity.saturating_mul(2))
        .build_lru::<String, u64>();
    lru.copy_to(&merged).context("copying LRU cache")?;
    manual.transfer_to(&merged).context("transferring manual cache")?;
    info!(
        "Merged cache holds {} entries; manual cache now holds {}",
        merged.len(),
        manual.len()
    );

    println!("lru: {}", serde_json::to_string_pretty(&lru.stats())?);
    println!("manual: {}", serde_json::to_string_pretty(&manual.stats())?);
    println!("merged: {}", serde_json::to_string_pretty(&merged.stats())?);

    manual.purge();
    info!("Demo complete");
    Ok(())
}
