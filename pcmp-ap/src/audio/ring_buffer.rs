//! Lock-free sample ring between a blocking writer and a device callback
//!
//! Wraps `ringbuf::HeapRb<f32>`. The writer side pushes interleaved
//! samples; the device callback pulls them, playing silence on underrun.
//! Flushing is requested by the writer and carried out by the callback,
//! since only the consumer may discard queued samples.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Counters and the flush handshake shared by both halves
#[derive(Debug, Default)]
struct RingShared {
    underruns: AtomicU64,
    flush_requested: AtomicU64,
    flush_completed: AtomicU64,
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy)]
pub struct RingStats {
    pub underruns: u64,
    pub capacity: usize,
    pub occupied: usize,
}

/// Create a ring holding `capacity` samples and split it
pub fn sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let capacity = capacity.max(1);
    debug!("Creating sample ring with capacity: {} samples", capacity);

    let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
    let shared = Arc::new(RingShared::default());
    (
        SampleProducer {
            producer,
            shared: Arc::clone(&shared),
        },
        SampleConsumer {
            consumer,
            shared,
            seen_flush: 0,
        },
    )
}

/// Writer half
pub struct SampleProducer {
    producer: HeapProd<f32>,
    shared: Arc<RingShared>,
}

impl SampleProducer {
    /// Push as many samples as fit; returns how many were taken
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Ask the consumer to discard everything currently queued.
    /// Returns the request number to pass to `flush_completed`.
    pub fn request_flush(&self) -> u64 {
        self.shared.flush_requested.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// True once the consumer has carried out flush request `request`
    pub fn flush_completed(&self, request: u64) -> bool {
        self.shared.flush_completed.load(Ordering::Acquire) >= request
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            underruns: self.shared.underruns.load(Ordering::Relaxed),
            capacity: self.producer.capacity().get(),
            occupied: self.producer.occupied_len(),
        }
    }
}

/// Device-callback half
pub struct SampleConsumer {
    consumer: HeapCons<f32>,
    shared: Arc<RingShared>,
    seen_flush: u64,
}

impl SampleConsumer {
    /// Fill `out` from the ring, converting each sample; silence on underrun.
    pub fn fill<T>(&mut self, out: &mut [T], convert: impl Fn(f32) -> T) {
        let requested = self.shared.flush_requested.load(Ordering::Acquire);
        if requested != self.seen_flush {
            let dropped = self.consumer.clear();
            self.seen_flush = requested;
            self.shared.flush_completed.store(requested, Ordering::Release);
            trace!("Flushed {} queued samples", dropped);
        }

        let mut short = false;
        for slot in out.iter_mut() {
            let sample = match self.consumer.try_pop() {
                Some(sample) => sample,
                None => {
                    short = true;
                    0.0
                }
            };
            *slot = convert(sample);
        }
        if short {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let (mut producer, _consumer) = sample_ring(4);
        assert_eq!(producer.push(&[0.1, 0.2, 0.3]), 3);
        assert_eq!(producer.push(&[0.4, 0.5]), 1);
        assert_eq!(producer.stats().occupied, 4);
    }

    #[test]
    fn test_fill_plays_silence_on_underrun() {
        let (mut producer, mut consumer) = sample_ring(8);
        producer.push(&[0.5, -0.5]);

        let mut out = [1.0f32; 4];
        consumer.fill(&mut out, |s| s);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0]);
        assert_eq!(producer.stats().underruns, 1);
    }

    #[test]
    fn test_flush_handshake() {
        let (mut producer, mut consumer) = sample_ring(8);
        producer.push(&[0.1, 0.2, 0.3]);

        let request = producer.request_flush();
        assert!(!producer.flush_completed(request));

        let mut out = [1.0f32; 2];
        consumer.fill(&mut out, |s| s);
        assert!(producer.flush_completed(request));
        assert_eq!(out, [0.0, 0.0]);

        producer.push(&[0.7]);
        let mut out = [0.0f32; 1];
        consumer.fill(&mut out, |s| s);
        assert_eq!(out, [0.7]);
    }

    #[test]
    fn test_fill_converts() {
        let (mut producer, mut consumer) = sample_ring(2);
        producer.push(&[0.5]);
        let mut out = [0i16; 1];
        consumer.fill(&mut out, |s| (s * i16::MAX as f32) as i16);
        assert_eq!(out[0], 16383);
    }
}
