// src/ingest/mod.rs

pub mod dispatcher;
pub mod feed;

pub use dispatcher::run_dispatcher;
pub use feed::{run_producer, FeedAdapter, ReplayFeed, SimulatedFeed, SnapshotRequester};
