// src/ingest/dispatcher.rs
//! Single consumer loop over the ring: read a header, read the body,
//! decode by tag, fan out to the typed queues.

use crate::queue::ClosableQueue;
use crate::storage::codec::{self, HEADER_LEN, TAG_BOOK_DIFF, TAG_TRADE};
use crate::storage::ring::SpscRing;
use crate::types::{BookEvent, Trade};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Initial scratch size; grown on demand for oversized diffs.
const SCRATCH_HINT: usize = 8 * 1024;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub fn run_dispatcher(
    ring: Arc<SpscRing>,
    trade_queue: Arc<ClosableQueue<Trade>>,
    book_queue: Arc<ClosableQueue<BookEvent>>,
    stop: Arc<AtomicBool>,
) {
    let mut scratch = vec![0u8; SCRATCH_HINT];
    let mut header = [0u8; HEADER_LEN];

    loop {
        // The producer writes whole frames, so a visible header implies the
        // body is visible too; short reads only mean "no frame yet".
        if ring.readable() < HEADER_LEN {
            if stop.load(Ordering::Acquire) && ring.readable() == 0 {
                break;
            }
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        let n = ring.read(&mut header);
        debug_assert_eq!(n, HEADER_LEN);
        let (tag, len) = codec::parse_header(&header);
        if len > scratch.len() {
            scratch.resize(len, 0);
        }
        while ring.readable() < len {
            if stop.load(Ordering::Acquire) {
                warn!(tag, len, "incomplete frame at shutdown; dropping");
                return;
            }
            std::thread::sleep(IDLE_SLEEP);
        }
        let n = ring.read(&mut scratch[..len]);
        debug_assert_eq!(n, len);
        let body = &scratch[..len];

        match tag {
            TAG_TRADE => match codec::decode_trade(body) {
                Ok(trade) => {
                    if !(trade.price.is_finite() && trade.price > 0.0 && trade.quantity > 0.0) {
                        warn!(
                            price = trade.price,
                            quantity = trade.quantity,
                            "discarding trade with non-positive price or quantity"
                        );
                        continue;
                    }
                    if trade_queue.push(trade).is_err() {
                        warn!("trade queue closed; dispatcher exiting");
                        return;
                    }
                }
                Err(err) => warn!(%err, "discarding malformed trade frame"),
            },
            TAG_BOOK_DIFF => match codec::decode_diff(body) {
                Ok(diff) => {
                    if book_queue.push(BookEvent::Diff(diff)).is_err() {
                        warn!("book queue closed; dispatcher exiting");
                        return;
                    }
                }
                Err(err) => warn!(%err, "discarding malformed diff frame"),
            },
            other => {
                // Reserved tag: the body was already consumed above.
                warn!(tag = other, len, "skipping frame with unknown tag");
            }
        }
    }
    info!("dispatcher drained; exiting");
}
