//! Size-bucketed pool of f32 sample buffers.
//!
//! The audio callback needs scratch space every block, and a general
//! allocator can stall it. [`BufferPool`] keeps zeroed `Vec<f32>` buffers in
//! fixed-size buckets behind lock-free MPMC queues, so renting and releasing
//! scratch on the audio thread is bounded-time in the steady state.
//!
//! ## Contract
//!
//! - [`rent`](BufferPool::rent) never blocks. It returns a zero-initialized
//!   buffer whose length is the smallest bucket size ≥ the request (an exact
//!   allocation above the largest bucket).
//! - [`release`](BufferPool::release) zero-fills the buffer and retains it
//!   only when its length matches a bucket exactly and that bucket holds
//!   fewer than [`MAX_PER_BUCKET`] buffers. Anything else is dropped to the
//!   host allocator, a benign leak rather than an error.
//! - Requests below [`MIN_POOLED_LEN`] bypass the pool entirely; at that
//!   size the allocation is cheaper than the bookkeeping.

use crossbeam::queue::ArrayQueue;
use std::sync::LazyLock;

/// Bucket capacities, smallest to largest.
pub const BUCKET_SIZES: [usize; 5] = [512, 1024, 2048, 4096, 8192];

/// Maximum buffers retained per bucket.
pub const MAX_PER_BUCKET: usize = 15;

/// Requests below this length skip the pool.
pub const MIN_POOLED_LEN: usize = 256;

/// Lock-free pool of zeroed sample buffers.
pub struct BufferPool {
    buckets: [ArrayQueue<Vec<f32>>; BUCKET_SIZES.len()],
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| ArrayQueue::new(MAX_PER_BUCKET)),
        }
    }

    /// Rent a zeroed buffer of at least `len` samples.
    ///
    /// The returned buffer's length is the matched bucket size (or exactly
    /// `len` when the pool is bypassed); callers slice `[..len]`.
    pub fn rent(&self, len: usize) -> Vec<f32> {
        if len < MIN_POOLED_LEN {
            return vec![0.0; len];
        }
        match BUCKET_SIZES.iter().position(|&size| size >= len) {
            Some(idx) => self.buckets[idx]
                .pop()
                .unwrap_or_else(|| vec![0.0; BUCKET_SIZES[idx]]),
            // Larger than the largest bucket: exact one-off allocation.
            None => vec![0.0; len],
        }
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer is zero-filled first. Buffers whose length matches no
    /// bucket, and buffers arriving at a full bucket, are dropped.
    pub fn release(&self, mut buf: Vec<f32>) {
        let Some(idx) = BUCKET_SIZES.iter().position(|&size| size == buf.len()) else {
            return;
        };
        buf.fill(0.0);
        // push returns the buffer on a full bucket; dropping it hands the
        // memory back to the allocator.
        let _ = self.buckets[idx].push(buf);
    }

    /// Number of buffers currently retained in the given bucket.
    pub fn retained(&self, bucket: usize) -> usize {
        self.buckets[bucket].len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide pool shared by every engine instance.
pub fn pool() -> &'static BufferPool {
    static POOL: LazyLock<BufferPool> = LazyLock::new(BufferPool::new);
    &POOL
}
