//! Bounded SPSC sample queue between a producer thread and the mixer.
//!
//! Every source owns one queue of interleaved f32 samples at the source's
//! native rate and channel count. The producer half lives with the decode
//! worker / capture callback / submitting application; the consumer half
//! lives with the mixer on the audio thread.
//!
//! Overflow policy is the producer's choice, matching the source variant:
//!
//! - [`push`](QueueProducer::push) accepts what fits and reports it; decode
//!   workers wrap it in a retry loop (blocking producer).
//! - [`push_lossy`](QueueProducer::push_lossy) drops the unfitting tail and
//!   counts it, since capture callbacks must never block.
//! - [`try_push_all`](QueueProducer::try_push_all) is all-or-nothing:
//!   realtime submit surfaces [`QueueFull`] to the caller instead of
//!   silently dropping.
//!
//! Seek flush is a two-step epoch handshake: the producer bumps the flush
//! epoch after repositioning its upstream, and the consumer (the only side
//! allowed to drain an SPSC ring) clears the queue and acknowledges on its
//! next service call. The producer holds new data until the ack so post-seek
//! samples are never flushed with the stale ones.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// All-or-nothing push refused: the queue lacked room for the whole block.
#[derive(Debug, thiserror::Error)]
#[error("sample queue full: {vacant} of {requested} samples would fit")]
pub struct QueueFull {
    /// Samples the caller tried to enqueue.
    pub requested: usize,
    /// Samples that would have fit.
    pub vacant: usize,
}

struct QueueShared {
    /// Samples dropped by `push_lossy` since creation.
    dropped_samples: AtomicU64,
    /// Bumped by the producer to request a drain.
    flush_epoch: AtomicU32,
    /// Last epoch the consumer drained to.
    drain_epoch: AtomicU32,
}

/// Create a bounded SPSC queue holding `capacity_samples` interleaved f32.
pub fn source_queue(capacity_samples: usize) -> (QueueProducer, QueueConsumer) {
    let rb = HeapRb::<f32>::new(capacity_samples.max(1));
    let (prod, cons) = rb.split();
    let shared = Arc::new(QueueShared {
        dropped_samples: AtomicU64::new(0),
        flush_epoch: AtomicU32::new(0),
        drain_epoch: AtomicU32::new(0),
    });
    (
        QueueProducer {
            inner: prod,
            shared: Arc::clone(&shared),
            capacity: capacity_samples.max(1),
        },
        QueueConsumer {
            inner: cons,
            shared,
        },
    )
}

/// Producer half of a source queue.
pub struct QueueProducer {
    inner: HeapProd<f32>,
    shared: Arc<QueueShared>,
    capacity: usize,
}

impl QueueProducer {
    /// Enqueue as many samples as fit; returns the count accepted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }

    /// Enqueue what fits and count the dropped tail.
    pub fn push_lossy(&mut self, samples: &[f32]) -> usize {
        let pushed = self.inner.push_slice(samples);
        let dropped = samples.len() - pushed;
        if dropped > 0 {
            self.shared
                .dropped_samples
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        pushed
    }

    /// Enqueue the whole block or nothing.
    pub fn try_push_all(&mut self, samples: &[f32]) -> Result<(), QueueFull> {
        let vacant = self.inner.vacant_len();
        if vacant < samples.len() {
            return Err(QueueFull {
                requested: samples.len(),
                vacant,
            });
        }
        let pushed = self.inner.push_slice(samples);
        debug_assert_eq!(pushed, samples.len());
        Ok(())
    }

    /// Free space, in samples.
    pub fn vacant(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Total queue capacity, in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples dropped by [`push_lossy`](Self::push_lossy) since creation.
    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped_samples.load(Ordering::Relaxed)
    }

    /// Ask the consumer to drain everything currently queued.
    ///
    /// The producer must not enqueue post-flush samples until
    /// [`flush_acknowledged`](Self::flush_acknowledged) reports true.
    pub fn request_flush(&self) {
        self.shared.flush_epoch.fetch_add(1, Ordering::Release);
    }

    /// Whether the consumer has drained up to the latest flush request.
    pub fn flush_acknowledged(&self) -> bool {
        self.shared.drain_epoch.load(Ordering::Acquire)
            == self.shared.flush_epoch.load(Ordering::Acquire)
    }
}

/// Consumer half of a source queue.
pub struct QueueConsumer {
    inner: HeapCons<f32>,
    shared: Arc<QueueShared>,
}

impl QueueConsumer {
    /// Dequeue up to `dst.len()` samples; returns the count read.
    ///
    /// Never blocks: an under-filled queue yields what is available.
    pub fn pop(&mut self, dst: &mut [f32]) -> usize {
        self.inner.pop_slice(dst)
    }

    /// Samples currently queued.
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Whether the queue holds no samples.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop everything currently queued.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Service a pending flush request, if any.
    ///
    /// Returns true when a drain happened; the caller should also discard
    /// any converted samples it buffered downstream of the queue.
    pub fn service_flush(&mut self) -> bool {
        let requested = self.shared.flush_epoch.load(Ordering::Acquire);
        if requested == self.shared.drain_epoch.load(Ordering::Relaxed) {
            return false;
        }
        self.inner.clear();
        self.shared.drain_epoch.store(requested, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let (mut prod, mut cons) = source_queue(8);
        assert_eq!(prod.push(&[1.0, 2.0, 3.0]), 3);
        let mut dst = [0.0; 8];
        assert_eq!(cons.pop(&mut dst), 3);
        assert_eq!(&dst[..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn pop_never_blocks_on_short_queue() {
        let (mut prod, mut cons) = source_queue(8);
        prod.push(&[0.5, 0.5]);
        let mut dst = [0.0; 6];
        assert_eq!(cons.pop(&mut dst), 2);
    }

    #[test]
    fn lossy_push_counts_dropped_tail() {
        let (mut prod, _cons) = source_queue(4);
        assert_eq!(prod.push_lossy(&[1.0; 6]), 4);
        assert_eq!(prod.dropped_samples(), 2);
    }

    #[test]
    fn all_or_nothing_push_refuses_partial() {
        let (mut prod, mut cons) = source_queue(4);
        prod.push(&[0.0; 3]);
        let err = prod.try_push_all(&[1.0; 2]).unwrap_err();
        assert_eq!(err.requested, 2);
        assert_eq!(err.vacant, 1);

        // Nothing was enqueued by the failed push.
        let mut dst = [9.0; 4];
        assert_eq!(cons.pop(&mut dst), 3);
        assert!(dst[..3].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn flush_handshake_drains_and_acks() {
        let (mut prod, mut cons) = source_queue(16);
        prod.push(&[1.0; 10]);

        prod.request_flush();
        assert!(!prod.flush_acknowledged());

        assert!(cons.service_flush());
        assert!(cons.is_empty());
        assert!(prod.flush_acknowledged());

        // No pending request: service is a no-op.
        assert!(!cons.service_flush());
    }
}
