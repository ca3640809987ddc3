//! bookflow: real-time market-microstructure analytics for a single trading pair.
//!
//! The pipeline ingests a feed of trades and incremental depth updates,
//! maintains a consistent local order book and derives three signal
//! families: iceberg detection, directional liquidity buckets (traded and
//! cancelled USD notional) and an order-book imbalance / spread cache.
//!
//! Layout mirrors the data flow: the feed producer frames records into a
//! byte ring (`storage`), the dispatcher fans typed records out to closable
//! queues (`queue`, `ingest`), the book worker reconciles snapshots and
//! diffs (`book`) and refreshes the metrics cache (`metrics`), and the
//! analytics worker runs the iceberg detector and liquidity tracker
//! (`analytics`). `pipeline` wires it all together; every emission goes
//! through a `MarketObserver` (`observer`).

pub mod analytics;
pub mod book;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod observer;
pub mod pipeline;
pub mod queue;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use ingest::feed::{FeedAdapter, ReplayFeed, SimulatedFeed, SnapshotRequester};
pub use metrics::{MetricsCache, MetricsSnapshot, Pressure};
pub use observer::{MarketObserver, ObserverEvent, RecordingObserver, StdoutObserver};
pub use pipeline::{Pipeline, SyncStats};
pub use types::{
    BookDiff, BookEvent, BookSnapshot, FeedEvent, LiquidityChange, PriceLevel, Side, Trade,
};
