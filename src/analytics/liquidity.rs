// src/analytics/liquidity.rs
//! Liquidity tracking: directional USD buckets over traded and cancelled
//! notional, plus level-change notifications near the top of book.
//!
//! Trade buckets are trade-driven only; depth updates feed cancel
//! detection and change notifications but never the trade buckets. All
//! state lives on the analytics worker; observer callbacks run
//! synchronously on it and must stay cheap.

use crate::config::PipelineConfig;
use crate::observer::MarketObserver;
use crate::types::{DepthUpdate, LiquidityChange, Side, Trade};

/// USD accumulator for one trade direction. `start_ts_ns == 0` means the
/// bucket is empty.
#[derive(Debug)]
struct TradeBucket {
    size_usd: f64,
    accum_usd: f64,
    same_flow: f64,
    opposite_flow: f64,
    start_ts_ns: u64,
}

impl TradeBucket {
    fn new(size_usd: f64) -> Self {
        TradeBucket {
            size_usd,
            accum_usd: 0.0,
            same_flow: 0.0,
            opposite_flow: 0.0,
            start_ts_ns: 0,
        }
    }

    fn clear(&mut self) {
        self.accum_usd = 0.0;
        self.same_flow = 0.0;
        self.opposite_flow = 0.0;
        self.start_ts_ns = 0;
    }
}

/// USD accumulator for one side's cancelled depth.
#[derive(Debug)]
struct CancelBucket {
    size_usd: f64,
    accum_usd: f64,
    total_usd: f64,
    start_ts_ns: u64,
}

impl CancelBucket {
    fn new(size_usd: f64) -> Self {
        CancelBucket {
            size_usd,
            accum_usd: 0.0,
            total_usd: 0.0,
            start_ts_ns: 0,
        }
    }

    fn clear(&mut self) {
        self.accum_usd = 0.0;
        self.total_usd = 0.0;
        self.start_ts_ns = 0;
    }
}

pub struct LiquidityTracker {
    buy: TradeBucket,
    sell: TradeBucket,
    cancel_buy: CancelBucket,
    cancel_sell: CancelBucket,
    cancel_fraction: f64,
    depth_levels_track: usize,
    depth_levels_report: usize,
}

impl LiquidityTracker {
    pub fn new(cfg: &PipelineConfig) -> Self {
        LiquidityTracker {
            buy: TradeBucket::new(cfg.buy_bucket_usd),
            sell: TradeBucket::new(cfg.sell_bucket_usd),
            cancel_buy: CancelBucket::new(cfg.cancel_bucket_usd),
            cancel_sell: CancelBucket::new(cfg.cancel_bucket_usd),
            cancel_fraction: cfg.cancel_fraction,
            depth_levels_track: cfg.depth_levels_track,
            depth_levels_report: cfg.depth_levels_report,
        }
    }

    /// Accumulate one execution into its directional bucket. A fill emits
    /// exactly one event and zeroes the bucket; the residual of an
    /// oversized trade is discarded.
    pub fn on_trade(&mut self, trade: &Trade, observer: &dyn MarketObserver) {
        let notional = trade.notional_usd();
        let ts_ns = trade.timestamp_ns;
        let (same, opposite, side) = if trade.is_buy() {
            (&mut self.buy, &mut self.sell, Side::Buy)
        } else {
            (&mut self.sell, &mut self.buy, Side::Sell)
        };

        if same.start_ts_ns == 0 {
            same.start_ts_ns = ts_ns;
        }
        same.accum_usd += notional;
        same.same_flow += notional;
        // The opposite bucket sees this as cross-flow evidence.
        opposite.opposite_flow += notional;

        if same.accum_usd >= same.size_usd {
            let duration_ns = ts_ns - same.start_ts_ns;
            let flow_ratio = same.same_flow / (same.same_flow + same.opposite_flow);
            observer.on_trade_bucket(side, duration_ns, same.size_usd, flow_ratio);
            same.clear();
        }
    }

    /// Consume the level deltas of one applied diff: change notifications
    /// within the report depth, cancel classification within the tracked
    /// depth.
    pub fn on_depth_update(&mut self, update: &DepthUpdate, observer: &dyn MarketObserver) {
        for delta in &update.deltas {
            let volume_delta = delta.new_volume - delta.prev_volume;
            if volume_delta == 0.0 {
                continue;
            }

            if delta.depth_rank < self.depth_levels_report {
                observer.on_liquidity_change(&LiquidityChange {
                    price: delta.price,
                    volume_delta,
                    timestamp_ns: update.timestamp_ns,
                    is_bid: delta.is_bid,
                });
            }

            if delta.prev_volume > 0.0 && delta.depth_rank < self.depth_levels_track {
                let cancelled = delta.prev_volume - delta.new_volume;
                if cancelled > self.cancel_fraction * delta.prev_volume {
                    self.process_cancel(
                        delta.is_bid,
                        cancelled * delta.price,
                        update.timestamp_ns,
                        observer,
                    );
                }
            }
        }
    }

    /// Accumulate cancelled USD notional for one side.
    pub fn process_cancel(
        &mut self,
        is_bid: bool,
        cancelled_usd: f64,
        ts_ns: u64,
        observer: &dyn MarketObserver,
    ) {
        let (bucket, side) = if is_bid {
            (&mut self.cancel_buy, Side::Buy)
        } else {
            (&mut self.cancel_sell, Side::Sell)
        };
        if bucket.start_ts_ns == 0 {
            bucket.start_ts_ns = ts_ns;
        }
        bucket.accum_usd += cancelled_usd;
        bucket.total_usd += cancelled_usd;

        if bucket.accum_usd >= bucket.size_usd {
            let duration_ns = ts_ns - bucket.start_ts_ns;
            let cancel_ratio = bucket.total_usd / bucket.size_usd;
            observer.on_cancel_bucket(side, duration_ns, bucket.size_usd, cancel_ratio);
            bucket.clear();
        }
    }

    /// Operator reset: drop all bucket state.
    pub fn reset(&mut self) {
        self.buy.clear();
        self.sell.clear();
        self.cancel_buy.clear();
        self.cancel_sell.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ObserverEvent, RecordingObserver};
    use crate::types::LevelDelta;

    fn tracker(buy_usd: f64, sell_usd: f64, cancel_usd: f64) -> LiquidityTracker {
        let cfg = PipelineConfig {
            buy_bucket_usd: buy_usd,
            sell_bucket_usd: sell_usd,
            cancel_bucket_usd: cancel_usd,
            ..Default::default()
        };
        LiquidityTracker::new(&cfg)
    }

    fn buy_trade(price: f64, quantity: f64, ts_ns: u64) -> Trade {
        Trade::new(price, quantity, ts_ns, 1, 0, 0, 0, true)
    }

    fn sell_trade(price: f64, quantity: f64, ts_ns: u64) -> Trade {
        Trade::new(price, quantity, ts_ns, 1, 0, 0, 0, false)
    }

    fn delta(price: f64, prev: f64, new: f64, is_bid: bool, rank: usize) -> LevelDelta {
        LevelDelta {
            price,
            prev_volume: prev,
            new_volume: new,
            is_bid,
            depth_rank: rank,
        }
    }

    fn depth(ts_ns: u64, deltas: Vec<LevelDelta>) -> DepthUpdate {
        DepthUpdate {
            timestamp_ns: ts_ns,
            deltas,
        }
    }

    #[test]
    fn buy_bucket_fills_with_duration_and_ratio() {
        let mut tracker = tracker(10_000.0, 10_000.0, 5_000.0);
        let observer = RecordingObserver::new();

        tracker.on_trade(&buy_trade(100.0, 30.0, 1_000_000_000), &observer);
        assert!(observer.is_empty());
        tracker.on_trade(&buy_trade(100.0, 80.0, 2_500_000_000), &observer);

        assert_eq!(
            observer.events(),
            vec![ObserverEvent::TradeBucket {
                side: Side::Buy,
                duration_ns: 1_500_000_000,
                size_usd: 10_000.0,
                flow_ratio: 1.0,
            }]
        );
    }

    #[test]
    fn emission_count_matches_total_notional() {
        // 25 trades of $1k each against a $5k bucket: exactly 5 fills.
        let mut tracker = tracker(5_000.0, 5_000.0, 5_000.0);
        let observer = RecordingObserver::new();
        for i in 0..25u64 {
            tracker.on_trade(&sell_trade(100.0, 10.0, 1_000 + i), &observer);
        }
        let fills = observer
            .events()
            .iter()
            .filter(|e| matches!(e, ObserverEvent::TradeBucket { side: Side::Sell, .. }))
            .count();
        assert_eq!(fills, 5);
    }

    #[test]
    fn exact_boundary_fills_and_next_trade_starts_fresh() {
        let mut tracker = tracker(1_000.0, 1_000.0, 1_000.0);
        let observer = RecordingObserver::new();
        tracker.on_trade(&buy_trade(100.0, 10.0, 50), &observer);
        assert_eq!(observer.len(), 1);

        // A fresh bucket starts at the next trade's timestamp.
        tracker.on_trade(&buy_trade(100.0, 10.0, 90), &observer);
        assert_eq!(observer.len(), 2);
        match observer.events()[1] {
            ObserverEvent::TradeBucket { duration_ns, .. } => assert_eq!(duration_ns, 0),
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn oversized_trade_completes_one_bucket_and_discards_residual() {
        let mut tracker = tracker(1_000.0, 1_000.0, 1_000.0);
        let observer = RecordingObserver::new();
        // $2.5k against a $1k bucket: one emission, residual gone.
        tracker.on_trade(&buy_trade(100.0, 25.0, 10), &observer);
        assert_eq!(observer.len(), 1);
        // Next $0.9k does not fill on its own.
        tracker.on_trade(&buy_trade(100.0, 9.0, 20), &observer);
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn flow_ratio_counts_opposite_flow() {
        let mut tracker = tracker(1_000.0, 1_000_000.0, 1_000.0);
        let observer = RecordingObserver::new();
        // $500 of sell flow lands in the buy bucket as opposite flow.
        tracker.on_trade(&sell_trade(100.0, 5.0, 10), &observer);
        // $1000 of buy flow fills the buy bucket.
        tracker.on_trade(&buy_trade(100.0, 10.0, 20), &observer);

        let events = observer.events();
        assert_eq!(events.len(), 1);
        match events[0] {
            ObserverEvent::TradeBucket { side, flow_ratio, .. } => {
                assert_eq!(side, Side::Buy);
                assert!((flow_ratio - 1_000.0 / 1_500.0).abs() < 1e-9);
            }
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn cancel_detection_respects_fraction() {
        let mut tracker = tracker(1e6, 1e6, 500.0);
        let observer = RecordingObserver::new();

        // 10.0 -> 3.0 cancels 70% of prior volume: $700 lands in the
        // cancel-buy bucket and fills it.
        tracker.on_depth_update(&depth(1_000, vec![delta(100.0, 10.0, 3.0, true, 0)]), &observer);
        let cancels: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ObserverEvent::CancelBucket { .. }))
            .collect();
        assert_eq!(
            cancels,
            vec![ObserverEvent::CancelBucket {
                side: Side::Buy,
                duration_ns: 0,
                size_usd: 500.0,
                cancel_ratio: 700.0 / 500.0,
            }]
        );

        // 10.0 -> 9.5 is only a 5% decrease: no cancel.
        tracker.on_depth_update(&depth(2_000, vec![delta(100.0, 10.0, 9.5, true, 0)]), &observer);
        let cancels = observer
            .events()
            .iter()
            .filter(|e| matches!(e, ObserverEvent::CancelBucket { .. }))
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn cancel_buckets_accumulate_across_updates() {
        let mut tracker = tracker(1e6, 1e6, 1_000.0);
        let observer = RecordingObserver::new();

        // Two $600 ask cancels: the second fills the sell cancel bucket.
        tracker.on_depth_update(&depth(1_000, vec![delta(100.0, 10.0, 4.0, false, 1)]), &observer);
        assert!(observer.events().iter().all(|e| !matches!(e, ObserverEvent::CancelBucket { .. })));
        tracker.on_depth_update(&depth(3_000, vec![delta(100.0, 10.0, 4.0, false, 1)]), &observer);

        let cancels: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ObserverEvent::CancelBucket { .. }))
            .collect();
        assert_eq!(
            cancels,
            vec![ObserverEvent::CancelBucket {
                side: Side::Sell,
                duration_ns: 2_000,
                size_usd: 1_000.0,
                cancel_ratio: 1.2,
            }]
        );
    }

    #[test]
    fn level_changes_reported_within_depth_only() {
        let mut tracker = tracker(1e6, 1e6, 1e6);
        let observer = RecordingObserver::new();
        tracker.on_depth_update(
            &depth(
                5_000,
                vec![
                    delta(100.0, 1.0, 2.0, true, 0),
                    delta(90.0, 1.0, 2.0, true, 25),
                    delta(80.0, 1.0, 2.0, true, usize::MAX),
                ],
            ),
            &observer,
        );
        let changes: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ObserverEvent::Liquidity(c) => Some(c),
                _ => None,
            })
            .collect();
        // Default report depth is 20: only the rank-0 delta is reported.
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].price, 100.0);
        assert_eq!(changes[0].volume_delta, 1.0);
        assert_eq!(changes[0].timestamp_ns, 5_000);
        assert!(changes[0].is_bid);
    }

    #[test]
    fn additions_never_classify_as_cancels() {
        let mut tracker = tracker(1e6, 1e6, 100.0);
        let observer = RecordingObserver::new();
        tracker.on_depth_update(&depth(1_000, vec![delta(100.0, 1.0, 50.0, true, 0)]), &observer);
        tracker.on_depth_update(&depth(2_000, vec![delta(100.0, 0.0, 50.0, true, 0)]), &observer);
        assert!(observer
            .events()
            .iter()
            .all(|e| !matches!(e, ObserverEvent::CancelBucket { .. })));
    }

    #[test]
    fn reset_clears_partial_buckets() {
        let mut tracker = tracker(1_000.0, 1_000.0, 1_000.0);
        let observer = RecordingObserver::new();
        tracker.on_trade(&buy_trade(100.0, 9.0, 10), &observer);
        tracker.process_cancel(true, 900.0, 10, &observer);
        tracker.reset();

        // Post-reset, the same partial amounts still do not fill.
        tracker.on_trade(&buy_trade(100.0, 9.0, 20), &observer);
        tracker.process_cancel(true, 900.0, 20, &observer);
        assert!(observer.is_empty());
    }
}
