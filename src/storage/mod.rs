// src/storage/mod.rs

pub mod codec;
pub mod ring;

pub use codec::{
    decode_diff, decode_trade, encode_diff_frame, encode_trade_frame, parse_header, HEADER_LEN,
    TAG_BOOK_DIFF, TAG_TRADE,
};
pub use ring::SpscRing;
