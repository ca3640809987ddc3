// src/types.rs

use serde::{Deserialize, Serialize};

/// Trade flag bit: aggressor was the buyer.
pub const FLAG_IS_BUY: u8 = 0b0000_0001;
/// Trade flag bit: the resting (maker) order was the buy order.
pub const FLAG_BUYER_MAKER: u8 = 0b0000_0010;

/// Direction of traded or cancelled flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Book-side mapping: bid liquidity belongs to buyers, ask to sellers.
    pub fn from_is_bid(is_bid: bool) -> Self {
        if is_bid {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Immutable trade execution record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub quantity: f64,
    pub timestamp_ns: u64,
    pub trade_id: u64,
    pub event_time_ms: u64,
    pub buyer_order_id: u64,
    pub seller_order_id: u64,
    /// Bit-packed `FLAG_IS_BUY` / `FLAG_BUYER_MAKER`; exactly one is set.
    pub flags: u8,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        price: f64,
        quantity: f64,
        timestamp_ns: u64,
        trade_id: u64,
        event_time_ms: u64,
        buyer_order_id: u64,
        seller_order_id: u64,
        is_buy: bool,
    ) -> Self {
        // is_buy is the inverse of is_buyer_maker: a buy aggressor lifts a
        // resting sell order.
        let flags = if is_buy { FLAG_IS_BUY } else { FLAG_BUYER_MAKER };
        Trade {
            price,
            quantity,
            timestamp_ns,
            trade_id,
            event_time_ms,
            buyer_order_id,
            seller_order_id,
            flags,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.flags & FLAG_IS_BUY != 0
    }

    pub fn is_buyer_maker(&self) -> bool {
        self.flags & FLAG_BUYER_MAKER != 0
    }

    /// USD notional of the execution.
    pub fn notional_usd(&self) -> f64 {
        self.price * self.quantity
    }
}

/// One price level of a depth update. `volume == 0` removes the level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

/// Incremental depth update covering feed sequence numbers
/// `[first_update_id, last_update_id]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookDiff {
    pub timestamp_ns: u64,
    pub first_update_id: u64,
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Complete book replacement as of sequence number `last_update_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp_ns: u64,
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Typed record produced by a feed adapter.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    Trade(Trade),
    Snapshot(BookSnapshot),
    Diff(BookDiff),
}

/// Record consumed by the book worker.
#[derive(Clone, Debug)]
pub enum BookEvent {
    Snapshot(BookSnapshot),
    Diff(BookDiff),
}

/// Non-zero volume change at one tracked level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidityChange {
    pub price: f64,
    pub volume_delta: f64,
    pub timestamp_ns: u64,
    pub is_bid: bool,
}

/// Post-diff view of one touched level, as produced by the reconciler.
///
/// `depth_rank` is the level's distance from the top of its side after the
/// diff (0 = best). Levels outside the tracked window carry `usize::MAX`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelDelta {
    pub price: f64,
    pub prev_volume: f64,
    pub new_volume: f64,
    pub is_bid: bool,
    pub depth_rank: usize,
}

/// Batch of level deltas from one applied diff.
#[derive(Clone, Debug)]
pub struct DepthUpdate {
    pub timestamp_ns: u64,
    pub deltas: Vec<LevelDelta>,
}
