// src/pipeline.rs
//! Orchestration: builds the ring, the queues and the metrics cache, owns
//! the worker threads and drives shutdown in reverse dependency order.

use crate::analytics::{IcebergDetector, LiquidityTracker};
use crate::book::{BookReconciler, OrderBook};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ingest::dispatcher::run_dispatcher;
use crate::ingest::feed::{run_producer, FeedAdapter, SnapshotRequester};
use crate::metrics::MetricsCache;
use crate::observer::MarketObserver;
use crate::queue::ClosableQueue;
use crate::storage::ring::SpscRing;
use crate::types::{BookEvent, DepthUpdate, Trade};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// Sequence health counters, shared between the reconciler and the
/// periodic health log.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub gaps: AtomicU64,
    pub resyncs: AtomicU64,
}

pub struct Pipeline {
    stop: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    metrics: Arc<MetricsCache>,
    stats: Arc<SyncStats>,
    trade_queue: Arc<ClosableQueue<Trade>>,
    book_queue: Arc<ClosableQueue<BookEvent>>,
    depth_queue: Arc<ClosableQueue<DepthUpdate>>,
    producer: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    book_worker: Option<JoinHandle<()>>,
    analytics_worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Validate the configuration and start all workers. The feed adapter
    /// runs on its own producer thread; all emissions go to `observer`.
    pub fn start(
        config: PipelineConfig,
        feed: Box<dyn FeedAdapter>,
        observer: Arc<dyn MarketObserver>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let reset_requested = Arc::new(AtomicBool::new(false));
        let ring = Arc::new(SpscRing::new(config.ring_capacity));
        let trade_queue = Arc::new(ClosableQueue::<Trade>::bounded(config.queue_capacity));
        let book_queue = Arc::new(ClosableQueue::<BookEvent>::bounded(config.queue_capacity));
        let depth_queue = Arc::new(ClosableQueue::<DepthUpdate>::bounded(config.queue_capacity));
        let requester = SnapshotRequester::default();
        let stats = Arc::new(SyncStats::default());
        let book = Arc::new(Mutex::new(OrderBook::default()));
        let metrics = Arc::new(MetricsCache::new(book.clone()));

        let producer = spawn("feed-producer", {
            let ring = ring.clone();
            let book_queue = book_queue.clone();
            let requester = requester.clone();
            let stop = stop.clone();
            move || run_producer(feed, ring, book_queue, requester, stop)
        })?;

        let dispatcher = spawn("dispatcher", {
            let ring = ring.clone();
            let trade_queue = trade_queue.clone();
            let book_queue = book_queue.clone();
            let stop = stop.clone();
            move || run_dispatcher(ring, trade_queue, book_queue, stop)
        })?;

        let book_worker = spawn("book-worker", {
            let book_queue = book_queue.clone();
            let depth_queue = depth_queue.clone();
            let metrics = metrics.clone();
            let stats = stats.clone();
            let tick_size = config.tick_size;
            let depth_window = config.depth_window();
            move || {
                let mut reconciler =
                    BookReconciler::new(book, tick_size, depth_window, requester, stats);
                while let Some(event) = book_queue.pop() {
                    let event_ts = match &event {
                        BookEvent::Snapshot(snap) => snap.timestamp_ns,
                        BookEvent::Diff(diff) => diff.timestamp_ns,
                    };
                    let updates = reconciler.on_event(event);
                    metrics.refresh(event_ts);
                    for update in updates {
                        if update.deltas.is_empty() {
                            continue;
                        }
                        if depth_queue.push(update).is_err() {
                            info!("depth queue closed; book worker exiting");
                            return;
                        }
                    }
                }
                info!("book queue drained; book worker exiting");
            }
        })?;

        let analytics_worker = spawn("analytics-worker", {
            let trade_queue = trade_queue.clone();
            let depth_queue = depth_queue.clone();
            let reset_requested = reset_requested.clone();
            let config = config.clone();
            move || {
                let mut iceberg = IcebergDetector::new(config.iceberg_threshold);
                let mut tracker = LiquidityTracker::new(&config);
                loop {
                    if reset_requested.swap(false, Ordering::AcqRel) {
                        tracker.reset();
                        iceberg.reset();
                        info!("analytics state reset");
                    }

                    let mut idle = true;
                    if let Some(trade) = trade_queue.try_pop() {
                        tracker.on_trade(&trade, observer.as_ref());
                        idle = false;
                    }
                    if let Some(update) = depth_queue.try_pop() {
                        iceberg.on_depth_update(&update, observer.as_ref());
                        tracker.on_depth_update(&update, observer.as_ref());
                        idle = false;
                    }

                    if idle {
                        if trade_queue.is_closed()
                            && trade_queue.is_empty()
                            && depth_queue.is_closed()
                            && depth_queue.is_empty()
                        {
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
                info!("analytics worker exiting");
            }
        })?;

        info!(symbol = %config.symbol, "pipeline started");
        Ok(Pipeline {
            stop,
            reset_requested,
            metrics,
            stats,
            trade_queue,
            book_queue,
            depth_queue,
            producer: Some(producer),
            dispatcher: Some(dispatcher),
            book_worker: Some(book_worker),
            analytics_worker: Some(analytics_worker),
        })
    }

    pub fn metrics(&self) -> Arc<MetricsCache> {
        self.metrics.clone()
    }

    pub fn sync_stats(&self) -> Arc<SyncStats> {
        self.stats.clone()
    }

    /// Ask the analytics worker to clear bucket and iceberg state.
    pub fn reset_analytics(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// Stop the feed, drain everything downstream, join all workers.
    pub fn shutdown(mut self) {
        info!("pipeline shutting down");
        self.stop.store(true, Ordering::Release);

        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        // The dispatcher drains the ring once the stop flag is up.
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        // Everything framed is now queued: close the ingest queues and let
        // the book worker finish before cutting off its output queue.
        self.trade_queue.close();
        self.book_queue.close();
        if let Some(handle) = self.book_worker.take() {
            let _ = handle.join();
        }
        self.depth_queue.close();
        if let Some(handle) = self.analytics_worker.take() {
            let _ = handle.join();
        }
        info!("pipeline stopped");
    }
}

fn spawn(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, PipelineError> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| PipelineError::Spawn { name, source })
}
