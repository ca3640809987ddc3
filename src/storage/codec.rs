// src/storage/codec.rs
//! Binary framing for records travelling through the ring.
//!
//! Every frame is a 5-byte header `{type: u8, length: u32 LE}` followed by
//! `length` body bytes. Bodies are fixed-layout little-endian:
//!
//! Trade (57 bytes):
//! `price:f64, quantity:f64, timestamp_ns:u64, trade_id:u64,
//!  event_time_ms:u64, buyer_order_id:u64, seller_order_id:u64, flags:u8`
//!
//! BookDiff (40 bytes + 16 per level):
//! `timestamp_ns:u64, first_update_id:u64, last_update_id:u64,
//!  bid_count:u32, ask_count:u32, bids.., asks..` with each level a pair
//! of `f64` (price, volume).

use crate::error::CodecError;
use crate::types::{BookDiff, PriceLevel, Trade};

pub const HEADER_LEN: usize = 5;
pub const TAG_TRADE: u8 = 0x01;
pub const TAG_BOOK_DIFF: u8 = 0x02;

pub const TRADE_BODY_LEN: usize = 57;
pub const DIFF_HEADER_LEN: usize = 40;
pub const LEVEL_LEN: usize = 16;

/// Split a frame header into `(tag, body_length)`.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> (u8, usize) {
    let len = u32::from_le_bytes(header[1..5].try_into().unwrap());
    (header[0], len as usize)
}

fn push_header(buf: &mut Vec<u8>, tag: u8, body_len: usize) {
    buf.push(tag);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
}

/// Encode a trade as a complete frame (header + body).
pub fn encode_trade_frame(trade: &Trade) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + TRADE_BODY_LEN);
    push_header(&mut buf, TAG_TRADE, TRADE_BODY_LEN);
    buf.extend_from_slice(&trade.price.to_le_bytes());
    buf.extend_from_slice(&trade.quantity.to_le_bytes());
    buf.extend_from_slice(&trade.timestamp_ns.to_le_bytes());
    buf.extend_from_slice(&trade.trade_id.to_le_bytes());
    buf.extend_from_slice(&trade.event_time_ms.to_le_bytes());
    buf.extend_from_slice(&trade.buyer_order_id.to_le_bytes());
    buf.extend_from_slice(&trade.seller_order_id.to_le_bytes());
    buf.push(trade.flags);
    buf
}

/// Encode a depth diff as a complete frame (header + body).
pub fn encode_diff_frame(diff: &BookDiff) -> Vec<u8> {
    let body_len = DIFF_HEADER_LEN + (diff.bids.len() + diff.asks.len()) * LEVEL_LEN;
    let mut buf = Vec::with_capacity(HEADER_LEN + body_len);
    push_header(&mut buf, TAG_BOOK_DIFF, body_len);
    buf.extend_from_slice(&diff.timestamp_ns.to_le_bytes());
    buf.extend_from_slice(&diff.first_update_id.to_le_bytes());
    buf.extend_from_slice(&diff.last_update_id.to_le_bytes());
    buf.extend_from_slice(&(diff.bids.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(diff.asks.len() as u32).to_le_bytes());
    for level in diff.bids.iter().chain(diff.asks.iter()) {
        buf.extend_from_slice(&level.price.to_le_bytes());
        buf.extend_from_slice(&level.volume.to_le_bytes());
    }
    buf
}

fn get_u32(body: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(body[at..at + 4].try_into().unwrap())
}

fn get_u64(body: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(body[at..at + 8].try_into().unwrap())
}

fn get_f64(body: &[u8], at: usize) -> f64 {
    f64::from_le_bytes(body[at..at + 8].try_into().unwrap())
}

/// Decode a trade body.
pub fn decode_trade(body: &[u8]) -> Result<Trade, CodecError> {
    if body.len() != TRADE_BODY_LEN {
        return Err(CodecError::LengthMismatch {
            declared: body.len(),
            actual: TRADE_BODY_LEN,
        });
    }
    Ok(Trade {
        price: get_f64(body, 0),
        quantity: get_f64(body, 8),
        timestamp_ns: get_u64(body, 16),
        trade_id: get_u64(body, 24),
        event_time_ms: get_u64(body, 32),
        buyer_order_id: get_u64(body, 40),
        seller_order_id: get_u64(body, 48),
        flags: body[56],
    })
}

/// Decode a depth-diff body.
pub fn decode_diff(body: &[u8]) -> Result<BookDiff, CodecError> {
    if body.len() < DIFF_HEADER_LEN {
        return Err(CodecError::Truncated {
            need: DIFF_HEADER_LEN,
            have: body.len(),
        });
    }
    let bid_count = get_u32(body, 24) as u64;
    let ask_count = get_u32(body, 28) as u64;

    // 64-bit math so adversarial counts cannot overflow the size check.
    let expected = DIFF_HEADER_LEN as u64 + (bid_count + ask_count) * LEVEL_LEN as u64;
    if body.len() as u64 != expected {
        return Err(CodecError::LengthMismatch {
            declared: body.len(),
            actual: expected as usize,
        });
    }

    let mut at = DIFF_HEADER_LEN;
    let mut read_levels = |count: u64| -> Vec<PriceLevel> {
        let mut levels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            levels.push(PriceLevel {
                price: get_f64(body, at),
                volume: get_f64(body, at + 8),
            });
            at += LEVEL_LEN;
        }
        levels
    };
    let bids = read_levels(bid_count);
    let asks = read_levels(ask_count);

    Ok(BookDiff {
        timestamp_ns: get_u64(body, 0),
        first_update_id: get_u64(body, 8),
        last_update_id: get_u64(body, 16),
        bids,
        asks,
    })
}
