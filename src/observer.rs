// src/observer.rs
//! Typed sink for everything the analytics emit. The default observer
//! formats to stdout; tests plug in a recording observer instead, keeping
//! printing out of the hot paths.

use crate::types::{LiquidityChange, Side};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

pub trait MarketObserver: Send + Sync {
    fn on_trade_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, flow_ratio: f64);
    fn on_cancel_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, cancel_ratio: f64);
    fn on_liquidity_change(&self, change: &LiquidityChange);
    fn on_iceberg(&self, side: Side, price: f64);
}

/// UTC wall-clock with millisecond precision, e.g. `2024-03-01 12:30:45.123`.
fn format_timestamp(timestamp_ns: u64) -> String {
    let secs = (timestamp_ns / 1_000_000_000) as i64;
    let ms = timestamp_ns / 1_000_000 % 1_000;
    match Utc.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(t) => format!("{}.{:03}", t.format("%Y-%m-%d %H:%M:%S"), ms),
        _ => timestamp_ns.to_string(),
    }
}

/// Default observer: human-readable console output.
pub struct StdoutObserver {
    symbol: String,
}

impl StdoutObserver {
    pub fn new(symbol: impl Into<String>) -> Self {
        StdoutObserver {
            symbol: symbol.into(),
        }
    }
}

impl MarketObserver for StdoutObserver {
    fn on_trade_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, flow_ratio: f64) {
        println!(
            "[{} {} BUCKET] ${:.2} filled in {:.1} ms, flow ratio {:.3}",
            self.symbol,
            side,
            size_usd,
            duration_ns as f64 / 1e6,
            flow_ratio
        );
    }

    fn on_cancel_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, cancel_ratio: f64) {
        println!(
            "[{} CANCEL {} BUCKET] ${:.2} cancelled in {:.1} ms, cancel ratio {:.3}",
            self.symbol,
            side,
            size_usd,
            duration_ns as f64 / 1e6,
            cancel_ratio
        );
    }

    fn on_liquidity_change(&self, change: &LiquidityChange) {
        println!(
            "[{}] [{}] LIQ {} {:.2} {}{:.4}",
            format_timestamp(change.timestamp_ns),
            self.symbol,
            if change.is_bid { "BID" } else { "ASK" },
            change.price,
            if change.volume_delta >= 0.0 { "+" } else { "" },
            change.volume_delta
        );
    }

    fn on_iceberg(&self, side: Side, price: f64) {
        println!(
            "[ICEBERG DETECTED] {} {} at ${:.2}",
            self.symbol,
            if side == Side::Buy { "BID" } else { "ASK" },
            price
        );
    }
}

/// Event captured by [`RecordingObserver`].
#[derive(Clone, Debug, PartialEq)]
pub enum ObserverEvent {
    TradeBucket {
        side: Side,
        duration_ns: u64,
        size_usd: f64,
        flow_ratio: f64,
    },
    CancelBucket {
        side: Side,
        duration_ns: u64,
        size_usd: f64,
        cancel_ratio: f64,
    },
    Liquidity(LiquidityChange),
    Iceberg { side: Side, price: f64 },
}

/// Observer that records every emission; used by tests and replays.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn take(&self) -> Vec<ObserverEvent> {
        std::mem::take(&mut self.events.lock())
    }
}

impl MarketObserver for RecordingObserver {
    fn on_trade_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, flow_ratio: f64) {
        self.events.lock().push(ObserverEvent::TradeBucket {
            side,
            duration_ns,
            size_usd,
            flow_ratio,
        });
    }

    fn on_cancel_bucket(&self, side: Side, duration_ns: u64, size_usd: f64, cancel_ratio: f64) {
        self.events.lock().push(ObserverEvent::CancelBucket {
            side,
            duration_ns,
            size_usd,
            cancel_ratio,
        });
    }

    fn on_liquidity_change(&self, change: &LiquidityChange) {
        self.events.lock().push(ObserverEvent::Liquidity(*change));
    }

    fn on_iceberg(&self, side: Side, price: f64) {
        self.events.lock().push(ObserverEvent::Iceberg { side, price });
    }
}
