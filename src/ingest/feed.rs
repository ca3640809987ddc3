// src/ingest/feed.rs
//! Feed boundary: adapters produce typed records, the producer loop frames
//! them into the ring. Transport, authentication, exchange JSON and
//! reconnect policy all live behind [`FeedAdapter`].

use crate::queue::ClosableQueue;
use crate::storage::ring::SpscRing;
use crate::storage::{encode_diff_frame, encode_trade_frame};
use crate::types::{BookDiff, BookEvent, BookSnapshot, FeedEvent, PriceLevel, Trade};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Source of typed feed records.
///
/// `next_event` is a lazy sequence; `None` means the feed has ended.
/// `on_snapshot_request` is invoked on the producer thread after the
/// reconciler detects a gap: the adapter must arrange for a fresh
/// [`BookSnapshot`] to appear in the event stream.
pub trait FeedAdapter: Send {
    fn next_event(&mut self) -> Option<FeedEvent>;
    fn on_snapshot_request(&mut self);
}

/// Cross-thread snapshot request flag. The reconciler raises it, the
/// producer loop drains it before pulling the next event.
#[derive(Clone, Default)]
pub struct SnapshotRequester(Arc<AtomicBool>);

impl SnapshotRequester {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Producer loop: trades and diffs are framed into the ring (whole frames
/// only; a frame that does not fit is dropped and logged), snapshots go
/// straight to the book queue since the wire protocol has no tag for them.
pub fn run_producer(
    mut feed: Box<dyn FeedAdapter>,
    ring: Arc<SpscRing>,
    book_queue: Arc<ClosableQueue<BookEvent>>,
    requester: SnapshotRequester,
    stop: Arc<AtomicBool>,
) {
    let mut dropped: u64 = 0;
    while !stop.load(Ordering::Acquire) {
        if requester.take() {
            feed.on_snapshot_request();
        }
        let Some(event) = feed.next_event() else {
            info!("feed exhausted; producer exiting");
            break;
        };
        match event {
            FeedEvent::Trade(trade) => {
                write_frame(&ring, &encode_trade_frame(&trade), &mut dropped);
            }
            FeedEvent::Diff(diff) => {
                write_frame(&ring, &encode_diff_frame(&diff), &mut dropped);
            }
            FeedEvent::Snapshot(snapshot) => {
                if book_queue.push(BookEvent::Snapshot(snapshot)).is_err() {
                    warn!("book queue closed; producer exiting");
                    break;
                }
            }
        }
    }
    if dropped > 0 {
        warn!(dropped, "producer dropped frames on a full ring");
    }
}

fn write_frame(ring: &SpscRing, frame: &[u8], dropped: &mut u64) {
    // Whole frames only: a partial write would desynchronize the framing.
    if ring.free() < frame.len() {
        *dropped += 1;
        warn!(len = frame.len(), "ring full; dropping frame");
        return;
    }
    let written = ring.write(frame);
    debug_assert_eq!(written, frame.len());
}

/// Deterministic scripted feed for tests and replays.
pub struct ReplayFeed {
    events: VecDeque<FeedEvent>,
    snapshot_source: Option<Box<dyn FnMut() -> BookSnapshot + Send>>,
}

impl ReplayFeed {
    pub fn new(events: Vec<FeedEvent>) -> Self {
        ReplayFeed {
            events: events.into(),
            snapshot_source: None,
        }
    }

    /// Attach a generator answering snapshot requests during the replay.
    pub fn with_snapshot_source(
        mut self,
        source: impl FnMut() -> BookSnapshot + Send + 'static,
    ) -> Self {
        self.snapshot_source = Some(Box::new(source));
        self
    }
}

impl FeedAdapter for ReplayFeed {
    fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.pop_front()
    }

    fn on_snapshot_request(&mut self) {
        if let Some(source) = self.snapshot_source.as_mut() {
            self.events.push_front(FeedEvent::Snapshot(source()));
        }
    }
}

/// Random-walk feed used by the demo binary: one snapshot, then a paced
/// stream of depth diffs and trades around a drifting mid price.
pub struct SimulatedFeed {
    rng: StdRng,
    tick: f64,
    depth: usize,
    pace: Duration,
    clock_ns: u64,
    next_update_id: u64,
    next_trade_id: u64,
    mid_ticks: i64,
    bids: BTreeMap<i64, f64>,
    asks: BTreeMap<i64, f64>,
    started: bool,
    snapshot_pending: bool,
}

impl SimulatedFeed {
    pub fn new(mid_price: f64, tick: f64, depth: usize, seed: u64) -> Self {
        SimulatedFeed {
            rng: StdRng::seed_from_u64(seed),
            tick,
            depth: depth.max(2),
            pace: Duration::from_millis(2),
            clock_ns: 1_700_000_000_000_000_000,
            next_update_id: 1,
            next_trade_id: 1,
            mid_ticks: (mid_price / tick).round() as i64,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            started: false,
            snapshot_pending: false,
        }
    }

    fn price(&self, ticks: i64) -> f64 {
        ticks as f64 * self.tick
    }

    fn seed_book(&mut self) {
        self.bids.clear();
        self.asks.clear();
        for i in 0..self.depth as i64 {
            let volume_bid = self.rng.gen_range(0.5..5.0);
            let volume_ask = self.rng.gen_range(0.5..5.0);
            self.bids.insert(self.mid_ticks - 1 - i, volume_bid);
            self.asks.insert(self.mid_ticks + 1 + i, volume_ask);
        }
    }

    fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            timestamp_ns: self.clock_ns,
            last_update_id: self.next_update_id - 1,
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(t, v)| PriceLevel {
                    price: self.price(*t),
                    volume: *v,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(t, v)| PriceLevel {
                    price: self.price(*t),
                    volume: *v,
                })
                .collect(),
        }
    }

    fn gen_diff(&mut self) -> BookDiff {
        let first = self.next_update_id;
        let touched = self.rng.gen_range(1..=4usize);
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for _ in 0..touched {
            let offset = self.rng.gen_range(1..=self.depth as i64);
            let is_bid = self.rng.gen_bool(0.5);
            // Occasionally pull a level entirely, otherwise reprice it.
            let volume = if self.rng.gen_bool(0.15) {
                0.0
            } else {
                self.rng.gen_range(0.2..5.0)
            };
            if is_bid {
                let ticks = self.mid_ticks - offset;
                if volume > 0.0 {
                    self.bids.insert(ticks, volume);
                    // Lift any ask the new bid would cross.
                    let crossed: Vec<i64> = self.asks.range(..=ticks).map(|(k, _)| *k).collect();
                    for k in crossed {
                        self.asks.remove(&k);
                        asks.push(PriceLevel {
                            price: self.price(k),
                            volume: 0.0,
                        });
                    }
                } else {
                    self.bids.remove(&ticks);
                }
                bids.push(PriceLevel {
                    price: self.price(ticks),
                    volume,
                });
            } else {
                let ticks = self.mid_ticks + offset;
                if volume > 0.0 {
                    self.asks.insert(ticks, volume);
                    let crossed: Vec<i64> = self.bids.range(ticks..).map(|(k, _)| *k).collect();
                    for k in crossed {
                        self.bids.remove(&k);
                        bids.push(PriceLevel {
                            price: self.price(k),
                            volume: 0.0,
                        });
                    }
                } else {
                    self.asks.remove(&ticks);
                }
                asks.push(PriceLevel {
                    price: self.price(ticks),
                    volume,
                });
            }
        }
        self.next_update_id = first + touched as u64;
        BookDiff {
            timestamp_ns: self.clock_ns,
            first_update_id: first,
            last_update_id: self.next_update_id - 1,
            bids,
            asks,
        }
    }

    fn gen_trade(&mut self) -> Trade {
        let is_buy = self.rng.gen_bool(0.5);
        let ticks = if is_buy {
            self.mid_ticks + 1
        } else {
            self.mid_ticks - 1
        };
        let trade_id = self.next_trade_id;
        self.next_trade_id += 1;
        Trade::new(
            self.price(ticks),
            self.rng.gen_range(0.01..2.0),
            self.clock_ns,
            trade_id,
            self.clock_ns / 1_000_000,
            self.rng.gen_range(1..u32::MAX as u64),
            self.rng.gen_range(1..u32::MAX as u64),
            is_buy,
        )
    }
}

impl FeedAdapter for SimulatedFeed {
    fn next_event(&mut self) -> Option<FeedEvent> {
        if !self.started {
            self.seed_book();
            self.started = true;
            return Some(FeedEvent::Snapshot(self.snapshot()));
        }
        if self.snapshot_pending {
            self.snapshot_pending = false;
            return Some(FeedEvent::Snapshot(self.snapshot()));
        }

        std::thread::sleep(self.pace);
        self.clock_ns += self.rng.gen_range(200_000..2_000_000);
        if self.rng.gen_bool(0.02) {
            self.mid_ticks += if self.rng.gen_bool(0.5) { 1 } else { -1 };
        }

        if self.rng.gen_bool(0.7) {
            Some(FeedEvent::Diff(self.gen_diff()))
        } else {
            Some(FeedEvent::Trade(self.gen_trade()))
        }
    }

    fn on_snapshot_request(&mut self) {
        self.snapshot_pending = true;
    }
}
