// src/main.rs

use anyhow::{Context, Result};
use bookflow::{Pipeline, Pressure, SimulatedFeed, StdoutObserver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

const HEALTH_LOG_EVERY: u64 = 5; // seconds

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = bookflow::config::load().context("configuration rejected")?;
    info!(?config, "starting bookflow");

    let observer = Arc::new(StdoutObserver::new(config.symbol.clone()));
    // Demo feed: a seeded random walk. A real deployment plugs its
    // exchange adapter in here.
    let feed = Box::new(SimulatedFeed::new(64_000.0, config.tick_size, 20, 1));

    let metrics_symbol = config.symbol.clone();
    let pipeline = Pipeline::start(config, feed, observer).context("pipeline failed to start")?;

    // Enter stops the run; health is logged while we wait.
    println!("bookflow running on {metrics_symbol}. Press Enter to stop.");
    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let stop_requested = stop_requested.clone();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            stop_requested.store(true, Ordering::Release);
        });
    }

    let metrics = pipeline.metrics();
    let stats = pipeline.sync_stats();
    let mut seconds = 0u64;
    while !stop_requested.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_secs(1));
        seconds += 1;
        if seconds % HEALTH_LOG_EVERY == 0 {
            let snap = metrics.latest();
            let rendered = serde_json::to_string(snap.as_ref())
                .unwrap_or_else(|e| format!("<serialize failed: {e}>"));
            info!(
                gaps = stats.gaps.load(Ordering::Relaxed),
                resyncs = stats.resyncs.load(Ordering::Relaxed),
                pressure = %Pressure::from_imbalance(snap.imbalance_10),
                metrics = %rendered,
                "health"
            );
        }
    }

    pipeline.shutdown();
    info!("bookflow stopped");
    Ok(())
}
