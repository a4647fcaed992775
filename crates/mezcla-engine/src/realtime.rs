//! Realtime source: the application is the producer.

use crate::error::Result;
use crate::source::{SourceControl, SourceId};
use mezcla_core::QueueProducer;

/// Producer handle for a realtime source.
///
/// The application pushes interleaved f32 frames with
/// [`submit`](Self::submit); the engine drains them on its own clock. The
/// handle is the queue's single producer, so it is owned, not cloned; the
/// embedded [`SourceControl`] is cloneable for sharing.
pub struct RealtimeSourceHandle {
    control: SourceControl,
    producer: QueueProducer,
}

impl RealtimeSourceHandle {
    pub(crate) fn new(control: SourceControl, producer: QueueProducer) -> Self {
        Self { control, producer }
    }

    /// The source's id.
    pub fn id(&self) -> SourceId {
        self.control.id()
    }

    /// Control surface shared with [`SourceManager`](crate::SourceManager)
    /// lookups.
    pub fn control(&self) -> &SourceControl {
        &self.control
    }

    /// Submit interleaved samples for playback.
    ///
    /// All-or-nothing: when the block does not fit the queue, nothing is
    /// enqueued and the overflow is returned to the caller; a realtime
    /// source never drops silently. Submissions must be whole frames.
    pub fn submit(&mut self, samples: &[f32]) -> Result<()> {
        let channels = self.control.entry.shared.src_channels as usize;
        if samples.len() % channels != 0 {
            return Err(crate::error::EngineError::InvalidArgument(format!(
                "submission of {} samples is not whole {}-channel frames",
                samples.len(),
                channels
            )));
        }
        self.producer.try_push_all(samples)?;
        Ok(())
    }

    /// Free space currently available to [`submit`](Self::submit), in
    /// samples.
    pub fn writable_samples(&self) -> usize {
        self.producer.vacant()
    }
}
