// src/book.rs
//! Order book reconciliation: snapshot + incremental diff merge with
//! sequence validation and resynchronization on gaps.
//!
//! The reconciler is the sole owner of the canonical book. The lock around
//! [`OrderBook`] exists only so the metrics cache can export a short-lived
//! coherent copy; nothing else reads it.

use crate::ingest::feed::SnapshotRequester;
use crate::pipeline::SyncStats;
use crate::types::{BookDiff, BookEvent, BookSnapshot, DepthUpdate, LevelDelta, PriceLevel};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Price -> volume, ascending by price. Best bid is the last key, best ask
/// the first.
pub type BookSide = BTreeMap<OrderedFloat<f64>, f64>;

#[derive(Debug, Default)]
pub struct OrderBook {
    pub bids: BookSide,
    pub asks: BookSide,
    pub last_update_id: u64,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, v)| (p.into_inner(), *v))
    }

    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks.iter().next().map(|(p, v)| (p.into_inner(), *v))
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }
}

/// `round(price / tick) * tick`; pass-through when `tick <= 0`.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).round() * tick
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookSyncState {
    Uninitialized,
    Synced,
    Resyncing,
}

pub struct BookReconciler {
    book: Arc<Mutex<OrderBook>>,
    state: BookSyncState,
    /// Diffs buffered while waiting for a snapshot.
    pending: Vec<BookDiff>,
    tick_size: f64,
    /// Widest depth window downstream consumers care about; ranks beyond
    /// it are reported as `usize::MAX`.
    depth_window: usize,
    requester: SnapshotRequester,
    stats: Arc<SyncStats>,
}

impl BookReconciler {
    pub fn new(
        book: Arc<Mutex<OrderBook>>,
        tick_size: f64,
        depth_window: usize,
        requester: SnapshotRequester,
        stats: Arc<SyncStats>,
    ) -> Self {
        BookReconciler {
            book,
            state: BookSyncState::Uninitialized,
            pending: Vec::new(),
            tick_size,
            depth_window,
            requester,
            stats,
        }
    }

    pub fn state(&self) -> BookSyncState {
        self.state
    }

    pub fn book(&self) -> Arc<Mutex<OrderBook>> {
        self.book.clone()
    }

    /// Apply one book event; returns a `DepthUpdate` per diff that actually
    /// mutated the book (a snapshot can release several buffered diffs).
    pub fn on_event(&mut self, event: BookEvent) -> Vec<DepthUpdate> {
        match event {
            BookEvent::Snapshot(snap) => self.apply_snapshot(snap),
            BookEvent::Diff(diff) => self.apply_diff(diff),
        }
    }

    /// Replace the book wholesale and replay any buffered diffs.
    pub fn apply_snapshot(&mut self, snap: BookSnapshot) -> Vec<DepthUpdate> {
        {
            let mut book = self.book.lock();
            book.bids.clear();
            book.asks.clear();
            for level in &snap.bids {
                let price = round_to_tick(level.price, self.tick_size);
                if level.volume > 0.0 {
                    book.bids.insert(OrderedFloat(price), level.volume);
                }
            }
            for level in &snap.asks {
                let price = round_to_tick(level.price, self.tick_size);
                if level.volume > 0.0 {
                    book.asks.insert(OrderedFloat(price), level.volume);
                }
            }
            book.last_update_id = snap.last_update_id;
        }

        if self.state == BookSyncState::Resyncing {
            self.stats.resyncs.fetch_add(1, Ordering::Relaxed);
        }
        self.state = BookSyncState::Synced;
        info!(
            last_update_id = snap.last_update_id,
            bids = snap.bids.len(),
            asks = snap.asks.len(),
            "snapshot applied; book synced"
        );

        // Replay buffered diffs in arrival order. Stale ones are discarded
        // by the duplicate rule, a non-contiguous one re-triggers resync.
        let pending = std::mem::take(&mut self.pending);
        let mut updates = Vec::new();
        for diff in pending {
            updates.extend(self.apply_diff(diff));
        }
        updates
    }

    /// Validate continuity and mutate incrementally. Out-of-order diffs are
    /// discarded or trigger a resync.
    pub fn apply_diff(&mut self, diff: BookDiff) -> Vec<DepthUpdate> {
        match self.state {
            BookSyncState::Uninitialized | BookSyncState::Resyncing => {
                self.pending.push(diff);
                Vec::new()
            }
            BookSyncState::Synced => {
                let current = self.book.lock().last_update_id;
                if diff.last_update_id <= current {
                    debug!(
                        last_update_id = diff.last_update_id,
                        current, "dropping stale diff"
                    );
                    return Vec::new();
                }
                if diff.first_update_id > current + 1 {
                    self.stats.gaps.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        first_update_id = diff.first_update_id,
                        current, "sequence gap detected; requesting fresh snapshot"
                    );
                    self.state = BookSyncState::Resyncing;
                    // The gapped diff may still be applicable once the new
                    // snapshot lands, so it is buffered rather than lost.
                    self.pending.push(diff);
                    self.requester.request();
                    return Vec::new();
                }
                vec![self.apply_levels(&diff)]
            }
        }
    }

    fn apply_levels(&mut self, diff: &BookDiff) -> DepthUpdate {
        let mut book = self.book.lock();
        let mut deltas = Vec::with_capacity(diff.bids.len() + diff.asks.len());
        for level in &diff.bids {
            Self::apply_level(&mut book.bids, level, self.tick_size, true, &mut deltas);
        }
        for level in &diff.asks {
            Self::apply_level(&mut book.asks, level, self.tick_size, false, &mut deltas);
        }
        book.last_update_id = diff.last_update_id;

        for delta in &mut deltas {
            let side = if delta.is_bid { &book.bids } else { &book.asks };
            delta.depth_rank = depth_rank(side, delta.price, delta.is_bid, self.depth_window);
        }

        DepthUpdate {
            timestamp_ns: diff.timestamp_ns,
            deltas,
        }
    }

    fn apply_level(
        side: &mut BookSide,
        level: &PriceLevel,
        tick: f64,
        is_bid: bool,
        deltas: &mut Vec<LevelDelta>,
    ) {
        let price = round_to_tick(level.price, tick);
        let key = OrderedFloat(price);
        let prev = side.get(&key).copied().unwrap_or(0.0);
        let new = if level.volume > 0.0 {
            side.insert(key, level.volume);
            level.volume
        } else {
            side.remove(&key);
            0.0
        };
        if new != prev {
            deltas.push(LevelDelta {
                price,
                prev_volume: prev,
                new_volume: new,
                is_bid,
                depth_rank: usize::MAX,
            });
        }
    }
}

/// Number of strictly better levels on `side` than `price`, capped at
/// `window` (capped values report `usize::MAX`). Works for removed prices
/// too: the rank is where the level would sit.
fn depth_rank(side: &BookSide, price: f64, is_bid: bool, window: usize) -> usize {
    let key = OrderedFloat(price);
    let better = if is_bid {
        side.range((Excluded(key), Unbounded)).take(window).count()
    } else {
        side.range((Unbounded, Excluded(key))).take(window).count()
    };
    if better < window {
        better
    } else {
        usize::MAX
    }
}
