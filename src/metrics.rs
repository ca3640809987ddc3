// src/metrics.rs
//! Derived spread / imbalance view over the reconciled book.
//!
//! The book lock is held just long enough to copy the two sides into flat
//! arrays; all arithmetic runs outside it. The finished snapshot is
//! published through an `ArcSwap`, so readers load a pointer and never
//! take a lock.

use crate::book::OrderBook;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Point-in-time derived metrics. Empty-side values default to 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub imbalance_2: f64,
    pub imbalance_10: f64,
    pub imbalance_20: f64,
    pub imbalance_all: f64,
    pub total_bid_liq_usd: f64,
    pub total_ask_liq_usd: f64,
    pub generated_at_ns: u64,
}

/// Interpretation band for an imbalance value. Positive imbalance means the
/// bid side carries more USD liquidity (buying pressure).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pressure {
    StrongBuy,
    ModerateBuy,
    Neutral,
    ModerateSell,
    StrongSell,
}

impl Pressure {
    pub fn from_imbalance(imbalance: f64) -> Self {
        if imbalance > 0.20 {
            Pressure::StrongBuy
        } else if imbalance > 0.05 {
            Pressure::ModerateBuy
        } else if imbalance < -0.20 {
            Pressure::StrongSell
        } else if imbalance < -0.05 {
            Pressure::ModerateSell
        } else {
            Pressure::Neutral
        }
    }
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Pressure::StrongBuy => "Strong Buying Pressure",
            Pressure::ModerateBuy => "Moderate Buying Pressure",
            Pressure::Neutral => "Neutral",
            Pressure::ModerateSell => "Moderate Selling Pressure",
            Pressure::StrongSell => "Strong Selling Pressure",
        };
        f.write_str(label)
    }
}

pub struct MetricsCache {
    book: Arc<Mutex<OrderBook>>,
    published: ArcSwap<MetricsSnapshot>,
}

impl MetricsCache {
    pub fn new(book: Arc<Mutex<OrderBook>>) -> Self {
        MetricsCache {
            book,
            published: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    /// Recompute from the current book and publish. Called by the book
    /// worker after every applied diff, or on demand.
    pub fn refresh(&self, generated_at_ns: u64) -> Arc<MetricsSnapshot> {
        let (bids, asks) = {
            let book = self.book.lock();
            let bids: Vec<(f64, f64)> = book
                .bids
                .iter()
                .rev()
                .map(|(p, v)| (p.into_inner(), *v))
                .collect();
            let asks: Vec<(f64, f64)> = book
                .asks
                .iter()
                .map(|(p, v)| (p.into_inner(), *v))
                .collect();
            (bids, asks)
        };

        let snapshot = Arc::new(compute(&bids, &asks, generated_at_ns));
        self.published.store(snapshot.clone());
        snapshot
    }

    /// Latest published snapshot; lock-free.
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.published.load_full()
    }
}

/// `bids` descending from the best bid, `asks` ascending from the best ask.
fn compute(bids: &[(f64, f64)], asks: &[(f64, f64)], generated_at_ns: u64) -> MetricsSnapshot {
    let best_bid = bids.first().map(|(p, _)| *p).unwrap_or(0.0);
    let best_ask = asks.first().map(|(p, _)| *p).unwrap_or(0.0);
    let spread = if best_bid > 0.0 && best_ask > 0.0 {
        best_ask - best_bid
    } else {
        0.0
    };

    let mut bid_usd = [0.0f64; 4]; // depths 2, 10, 20, all
    let mut ask_usd = [0.0f64; 4];
    accumulate(bids, &mut bid_usd);
    accumulate(asks, &mut ask_usd);

    let imbalance = |i: usize| {
        let total = bid_usd[i] + ask_usd[i];
        if total > 0.0 {
            (bid_usd[i] - ask_usd[i]) / total
        } else {
            0.0
        }
    };

    MetricsSnapshot {
        best_bid,
        best_ask,
        spread,
        imbalance_2: imbalance(0),
        imbalance_10: imbalance(1),
        imbalance_20: imbalance(2),
        imbalance_all: imbalance(3),
        total_bid_liq_usd: bid_usd[3],
        total_ask_liq_usd: ask_usd[3],
        generated_at_ns,
    }
}

fn accumulate(levels: &[(f64, f64)], usd: &mut [f64; 4]) {
    for (count, (price, volume)) in levels.iter().enumerate() {
        let value = price * volume;
        if count < 2 {
            usd[0] += value;
        }
        if count < 10 {
            usd[1] += value;
        }
        if count < 20 {
            usd[2] += value;
        }
        usd[3] += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;

    fn cache_with(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> MetricsCache {
        let mut book = OrderBook::default();
        for (p, v) in bids {
            book.bids.insert(OrderedFloat(*p), *v);
        }
        for (p, v) in asks {
            book.asks.insert(OrderedFloat(*p), *v);
        }
        MetricsCache::new(Arc::new(Mutex::new(book)))
    }

    #[test]
    fn bid_heavy_book_reads_strong_buy() {
        // bids $1000 vs asks $505 -> imbalance ~ +0.329.
        let cache = cache_with(&[(100.0, 10.0)], &[(101.0, 5.0)]);
        let snap = cache.refresh(42);

        assert_eq!(snap.best_bid, 100.0);
        assert_eq!(snap.best_ask, 101.0);
        assert_eq!(snap.spread, 1.0);
        assert!((snap.imbalance_2 - 495.0 / 1505.0).abs() < 1e-9);
        assert_eq!(Pressure::from_imbalance(snap.imbalance_2), Pressure::StrongBuy);
        assert_eq!(snap.generated_at_ns, 42);
    }

    #[test]
    fn one_sided_books_saturate_imbalance() {
        let bids_only = cache_with(&[(100.0, 1.0), (99.0, 1.0)], &[]).refresh(1);
        assert_eq!(bids_only.imbalance_2, 1.0);
        assert_eq!(bids_only.imbalance_all, 1.0);

        let asks_only = cache_with(&[], &[(101.0, 1.0)]).refresh(1);
        assert_eq!(asks_only.imbalance_2, -1.0);
        assert_eq!(asks_only.imbalance_all, -1.0);
    }

    #[test]
    fn empty_book_is_neutral() {
        let snap = cache_with(&[], &[]).refresh(1);
        assert_eq!(snap.imbalance_2, 0.0);
        assert_eq!(snap.imbalance_all, 0.0);
        assert_eq!(snap.spread, 0.0);
        assert_eq!(Pressure::from_imbalance(snap.imbalance_all), Pressure::Neutral);
    }

    #[test]
    fn depth_limits_partition_the_book() {
        // 12 bid levels worth $100 each against one $100 ask level.
        let bids: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let price = 100.0 - i as f64;
                (price, 100.0 / price)
            })
            .collect();
        let cache = cache_with(&bids, &[(200.0, 0.5)]);
        let snap = cache.refresh(1);

        let imb = |bid: f64, ask: f64| (bid - ask) / (bid + ask);
        assert!((snap.imbalance_2 - imb(200.0, 100.0)).abs() < 1e-9);
        assert!((snap.imbalance_10 - imb(1_000.0, 100.0)).abs() < 1e-9);
        assert!((snap.imbalance_20 - imb(1_200.0, 100.0)).abs() < 1e-9);
        assert!((snap.total_bid_liq_usd - 1_200.0).abs() < 1e-9);
        assert!((snap.total_ask_liq_usd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn pressure_bands() {
        assert_eq!(Pressure::from_imbalance(0.25), Pressure::StrongBuy);
        assert_eq!(Pressure::from_imbalance(0.10), Pressure::ModerateBuy);
        assert_eq!(Pressure::from_imbalance(0.0), Pressure::Neutral);
        assert_eq!(Pressure::from_imbalance(-0.10), Pressure::ModerateSell);
        assert_eq!(Pressure::from_imbalance(-0.25), Pressure::StrongSell);
        assert_eq!(Pressure::from_imbalance(0.05), Pressure::Neutral);
        assert_eq!(Pressure::from_imbalance(-0.05), Pressure::Neutral);
    }

    #[test]
    fn refresh_replaces_published_snapshot() {
        let cache = cache_with(&[(100.0, 1.0)], &[(101.0, 1.0)]);
        assert_eq!(cache.latest().generated_at_ns, 0);
        cache.refresh(7);
        assert_eq!(cache.latest().generated_at_ns, 7);
        assert_eq!(cache.latest().best_bid, 100.0);
    }

    #[test]
    fn snapshot_serializes_for_health_log() {
        let snap = cache_with(&[(100.0, 1.0)], &[(101.0, 1.0)]).refresh(9);
        let json = serde_json::to_string(snap.as_ref()).unwrap();
        assert!(json.contains("\"best_bid\":100.0"));
        assert!(json.contains("\"generated_at_ns\":9"));
    }
}
