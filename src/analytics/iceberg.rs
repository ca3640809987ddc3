// src/analytics/iceberg.rs
//! Iceberg detection: a level whose visible quantity keeps shrinking
//! without disappearing is being refilled from hidden size. Heuristic by
//! nature; false positives are acceptable.

use crate::observer::MarketObserver;
use crate::types::{DepthUpdate, Side};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct LevelState {
    last_quantity: f64,
    counter: u32,
}

pub struct IcebergDetector {
    threshold: u32,
    bids: BTreeMap<OrderedFloat<f64>, LevelState>,
    asks: BTreeMap<OrderedFloat<f64>, LevelState>,
}

impl IcebergDetector {
    pub fn new(threshold: u32) -> Self {
        IcebergDetector {
            threshold,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Feed the post-diff state of every level a diff touched.
    pub fn on_depth_update(&mut self, update: &DepthUpdate, observer: &dyn MarketObserver) {
        for delta in &update.deltas {
            self.observe(delta.is_bid, delta.price, delta.new_volume, observer);
        }
    }

    /// Observe one `(side, price, quantity)` tuple. A partial decrease
    /// bumps the refill counter; on the configured threshold an iceberg
    /// event fires and the counter restarts. Anything else resets it.
    pub fn observe(
        &mut self,
        is_bid: bool,
        price: f64,
        quantity: f64,
        observer: &dyn MarketObserver,
    ) {
        let side = if is_bid { &mut self.bids } else { &mut self.asks };
        if quantity <= 0.0 {
            side.remove(&OrderedFloat(price));
            return;
        }
        let state = side.entry(OrderedFloat(price)).or_default();
        if quantity < state.last_quantity {
            state.counter += 1;
            if state.counter >= self.threshold {
                observer.on_iceberg(Side::from_is_bid(is_bid), price);
                state.counter = 0;
            }
        } else {
            state.counter = 0;
        }
        state.last_quantity = quantity;
    }

    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ObserverEvent, RecordingObserver};

    #[test]
    fn three_partial_refills_emit_once() {
        let mut detector = IcebergDetector::new(3);
        let observer = RecordingObserver::new();

        for quantity in [10.0, 8.0, 6.0, 4.0] {
            detector.observe(true, 100.0, quantity, &observer);
        }
        assert_eq!(
            observer.events(),
            vec![ObserverEvent::Iceberg {
                side: Side::Buy,
                price: 100.0
            }]
        );

        // Counter restarted: two more decreases stay silent.
        detector.observe(true, 100.0, 3.0, &observer);
        detector.observe(true, 100.0, 2.0, &observer);
        assert_eq!(observer.len(), 1);
        // The third fires again.
        detector.observe(true, 100.0, 1.0, &observer);
        assert_eq!(observer.len(), 2);
    }

    #[test]
    fn non_decreasing_quantities_never_trigger() {
        let mut detector = IcebergDetector::new(3);
        let observer = RecordingObserver::new();
        for quantity in [1.0, 1.0, 2.0, 2.0, 5.0, 5.0, 9.0] {
            detector.observe(false, 101.0, quantity, &observer);
        }
        assert!(observer.is_empty());
    }

    #[test]
    fn increase_resets_the_counter() {
        let mut detector = IcebergDetector::new(3);
        let observer = RecordingObserver::new();
        for quantity in [10.0, 8.0, 6.0, 12.0, 9.0, 7.0] {
            detector.observe(true, 100.0, quantity, &observer);
        }
        // Two decreases, reset, two decreases: never reaches three.
        assert!(observer.is_empty());
    }

    #[test]
    fn removal_clears_state() {
        let mut detector = IcebergDetector::new(2);
        let observer = RecordingObserver::new();
        detector.observe(true, 100.0, 10.0, &observer);
        detector.observe(true, 100.0, 8.0, &observer);
        // Level pulled entirely, then reappears: counting starts over.
        detector.observe(true, 100.0, 0.0, &observer);
        detector.observe(true, 100.0, 10.0, &observer);
        detector.observe(true, 100.0, 9.0, &observer);
        assert!(observer.is_empty());
        detector.observe(true, 100.0, 8.0, &observer);
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn sides_are_independent() {
        let mut detector = IcebergDetector::new(2);
        let observer = RecordingObserver::new();
        detector.observe(true, 100.0, 10.0, &observer);
        detector.observe(false, 100.0, 10.0, &observer);
        detector.observe(true, 100.0, 9.0, &observer);
        detector.observe(false, 100.0, 9.0, &observer);
        assert!(observer.is_empty());
        detector.observe(true, 100.0, 8.0, &observer);
        assert_eq!(
            observer.events(),
            vec![ObserverEvent::Iceberg {
                side: Side::Buy,
                price: 100.0
            }]
        );
    }
}
