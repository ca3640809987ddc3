// src/storage/ring.rs
//! In-memory byte ring between the feed producer and the dispatcher.
//!
//! Single producer, single consumer. `head` is advanced by the producer
//! with a release store after the bytes are in place; the consumer pairs
//! it with an acquire load before copying out, and symmetrically for
//! `tail`. One slot stays unused so a full ring is distinguishable from an
//! empty one. Using the ring from more than one producer or consumer is
//! undefined.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SpscRing {
    buf: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    read_only: bool,
}

// The head/tail protocol guarantees the producer and consumer never touch
// the same bytes concurrently.
unsafe impl Send for SpscRing {}
unsafe impl Sync for SpscRing {}

impl SpscRing {
    /// Create a ring of `capacity` bytes. Capacity must be a power of two
    /// (enforced by config validation before construction).
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "ring capacity must be a power of two, got {capacity}"
        );
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SpscRing {
            buf,
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            read_only: false,
        }
    }

    /// Variant that rejects all writes.
    pub fn read_only(capacity: usize) -> Self {
        SpscRing {
            read_only: true,
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Free space as seen by the producer.
    pub fn free(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + self.capacity - head - 1) % self.capacity
    }

    /// Readable bytes as seen by the consumer.
    pub fn readable(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        (head + self.capacity - tail) % self.capacity
    }

    /// Copy up to `data.len()` bytes in, wrapping in at most two segments.
    /// Returns the number of bytes written: 0 when full or read-only.
    pub fn write(&self, data: &[u8]) -> usize {
        if self.read_only {
            return 0;
        }
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let space = (tail + self.capacity - head - 1) % self.capacity;
        let to_write = data.len().min(space);
        if to_write == 0 {
            return 0;
        }

        let base = self.buf.as_ptr() as *mut u8;
        let first = to_write.min(self.capacity - head);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), base.add(head), first);
            let second = to_write - first;
            if second > 0 {
                ptr::copy_nonoverlapping(data.as_ptr().add(first), base, second);
            }
        }

        self.head
            .store((head + to_write) % self.capacity, Ordering::Release);
        to_write
    }

    /// Copy up to `out.len()` bytes out, wrapping in at most two segments.
    /// Returns the number of bytes read: 0 when empty.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        let available = (head + self.capacity - tail) % self.capacity;
        let to_read = out.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let base = self.buf.as_ptr() as *const u8;
        let first = to_read.min(self.capacity - tail);
        unsafe {
            ptr::copy_nonoverlapping(base.add(tail), out.as_mut_ptr(), first);
            let second = to_read - first;
            if second > 0 {
                ptr::copy_nonoverlapping(base, out.as_mut_ptr().add(first), second);
            }
        }

        self.tail
            .store((tail + to_read) % self.capacity, Ordering::Release);
        to_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn write_then_read_round_trips() {
        let ring = SpscRing::new(64);
        let written = ring.write(b"hello ring");
        assert_eq!(written, 10);
        assert_eq!(ring.readable(), 10);

        let mut out = [0u8; 16];
        let read = ring.read(&mut out);
        assert_eq!(&out[..read], b"hello ring");
        assert_eq!(ring.readable(), 0);
    }

    #[test]
    fn wrap_around_preserves_order() {
        // Capacity 16: write A..J, read 8, write K..R, read 10 -> IJKLMNOPQR.
        let ring = SpscRing::new(16);
        assert_eq!(ring.write(b"ABCDEFGHIJ"), 10);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(&out, b"ABCDEFGH");

        assert_eq!(ring.write(b"KLMNOPQR"), 8);

        let mut out = [0u8; 10];
        assert_eq!(ring.read(&mut out), 10);
        assert_eq!(&out, b"IJKLMNOPQR");

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn never_holds_more_than_capacity_minus_one() {
        let ring = SpscRing::new(16);
        assert_eq!(ring.write(&[0xAA; 32]), 15);
        assert_eq!(ring.readable(), 15);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.write(&[0xBB]), 0);
    }

    #[test]
    fn read_only_rejects_writes() {
        let ring = SpscRing::read_only(16);
        assert!(ring.is_read_only());
        assert_eq!(ring.write(b"data"), 0);
        assert_eq!(ring.readable(), 0);
    }

    #[test]
    fn concurrent_stream_arrives_in_order() {
        let ring = Arc::new(SpscRing::new(256));
        let total: usize = 64 * 1024;

        let producer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                let mut sent = 0usize;
                while sent < total {
                    let byte = [(sent % 251) as u8];
                    if ring.write(&byte) == 1 {
                        sent += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut received = 0usize;
        let mut out = [0u8; 64];
        while received < total {
            let n = ring.read(&mut out);
            for &b in &out[..n] {
                assert_eq!(b, (received % 251) as u8);
                received += 1;
            }
            if n == 0 {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
