//! Engine events, recorded on the audio path and drained by the application.
//!
//! The audio thread must not block or allocate to report a problem, so
//! events go through a bounded lock-free queue. When the application falls
//! behind and the queue fills, new events are counted and dropped: losing
//! an underrun notification is preferable to stalling the render.

use crate::source::SourceId;
use crossbeam::queue::ArrayQueue;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Queue depth; enough for several seconds of worst-case underrun chatter.
const EVENT_CAPACITY: usize = 256;

/// Something the engine wants the application to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A source's queue could not cover a render block; the shortfall was
    /// zero-padded.
    BufferUnderrun {
        /// The under-supplied source.
        source: SourceId,
        /// Output frames that had to be padded.
        frames_missed: u32,
    },
    /// A file source hit the end of its stream (loop disabled).
    EndOfStream {
        /// The finished source.
        source: SourceId,
    },
    /// A file source failed to decode and entered the errored state.
    DecodeError {
        /// The failed source.
        source: SourceId,
        /// File the decoder was reading.
        path: PathBuf,
        /// Human-readable cause.
        message: String,
    },
    /// The device backend reported a streaming failure.
    DeviceError {
        /// Human-readable cause.
        message: String,
    },
}

/// Bounded MPMC event queue.
pub(crate) struct EventQueue {
    inner: ArrayQueue<EngineEvent>,
    lost: AtomicU64,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: ArrayQueue::new(EVENT_CAPACITY),
            lost: AtomicU64::new(0),
        }
    }

    /// Record an event; drops (and counts) it when the queue is full.
    pub(crate) fn push(&self, event: EngineEvent) {
        if self.inner.push(event).is_err() {
            self.lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the oldest pending event.
    pub(crate) fn pop(&self) -> Option<EngineEvent> {
        self.inner.pop()
    }

    /// Events dropped because the application fell behind.
    pub(crate) fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_out_in_order() {
        let queue = EventQueue::new();
        queue.push(EngineEvent::DeviceError {
            message: "a".into(),
        });
        queue.push(EngineEvent::DeviceError {
            message: "b".into(),
        });

        assert_eq!(
            queue.pop(),
            Some(EngineEvent::DeviceError {
                message: "a".into()
            })
        );
        assert_eq!(
            queue.pop(),
            Some(EngineEvent::DeviceError {
                message: "b".into()
            })
        );
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn overflow_drops_and_counts() {
        let queue = EventQueue::new();
        for _ in 0..EVENT_CAPACITY + 3 {
            queue.push(EngineEvent::DeviceError {
                message: String::new(),
            });
        }
        assert_eq!(queue.lost(), 3);
    }
}
