//! Source model: identity, state, and the lock-free control block shared
//! between the application and the audio thread.
//!
//! Every mixer-visible control is a single-word atomic read with relaxed
//! ordering once per callback. Independent scalars may tear relative to one
//! another (setting volume and tempo "simultaneously" can land on different
//! callbacks) but no individual value is ever torn, and there is no
//! compound state to corrupt.
//!
//! The audio-thread half of a source (queue consumer, conversion pipeline,
//! processor chain) lives in a [`SourceLane`] behind a mutex that is
//! uncontended by contract: the application only touches lanes between
//! callbacks (chain edits) or while the transport is stopped.

use crate::error::{EngineError, Result};
use mezcla_core::{ProcessorChain, QueueConsumer, SourcePipeline};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Stable, process-unique source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Lifecycle state of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceState {
    /// Created, engine not consuming yet.
    Idle = 0,
    /// Engine running, waiting for the first data.
    Buffering = 1,
    /// Being mixed.
    Playing = 2,
    /// Held by the transport; position frozen.
    Paused = 3,
    /// Ran out of data with looping disabled.
    EndOfStream = 4,
    /// Producer failed; see the drained event for the cause.
    Errored = 5,
}

impl SourceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SourceState::Buffering,
            2 => SourceState::Playing,
            3 => SourceState::Paused,
            4 => SourceState::EndOfStream,
            5 => SourceState::Errored,
            _ => SourceState::Idle,
        }
    }
}

/// Which producer feeds a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Decode worker reading a file.
    File,
    /// Capture callback from the input device.
    Input,
    /// Application-submitted sample stream.
    Realtime,
}

/// Sentinel duration for sources with no defined end.
pub const DURATION_INFINITE: u64 = u64::MAX;

pub(crate) const SEEK_NONE: u64 = u64::MAX;

/// Volume clamp range.
const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
/// Tempo clamp range, percent change.
const TEMPO_RANGE: (f64, f64) = (-20.0, 20.0);
/// Pitch clamp range, semitones.
const PITCH_RANGE: (f64, f64) = (-6.0, 6.0);

/// Control block shared by the application, the producer, and the mixer.
pub(crate) struct SharedSource {
    pub(crate) id: SourceId,
    pub(crate) name: Option<String>,
    pub(crate) kind: SourceKind,
    pub(crate) src_rate: u32,
    pub(crate) src_channels: u16,
    pub(crate) duration_frames: u64,
    state: AtomicU8,
    volume_bits: AtomicU32,
    tempo_bits: AtomicU64,
    pitch_bits: AtomicU64,
    looping: AtomicBool,
    enabled: AtomicBool,
    position_frames: AtomicU64,
    underrun_count: AtomicU64,
    overrun_samples: AtomicU64,
    seek_request: AtomicU64,
}

impl SharedSource {
    pub(crate) fn new(
        id: SourceId,
        name: Option<String>,
        kind: SourceKind,
        src_rate: u32,
        src_channels: u16,
        duration_frames: u64,
        volume: f32,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            src_rate,
            src_channels,
            duration_frames,
            state: AtomicU8::new(SourceState::Idle as u8),
            volume_bits: AtomicU32::new(volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1).to_bits()),
            tempo_bits: AtomicU64::new(0.0f64.to_bits()),
            pitch_bits: AtomicU64::new(0.0f64.to_bits()),
            looping: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            position_frames: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            overrun_samples: AtomicU64::new(0),
            seek_request: AtomicU64::new(SEEK_NONE),
        }
    }

    pub(crate) fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: SourceState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        let clamped = if volume.is_nan() {
            VOLUME_RANGE.0
        } else {
            volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1)
        };
        self.volume_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_tempo(&self, tempo: f64) {
        let clamped = if tempo.is_nan() {
            0.0
        } else {
            tempo.clamp(TEMPO_RANGE.0, TEMPO_RANGE.1)
        };
        self.tempo_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn pitch(&self) -> f64 {
        f64::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_pitch(&self, semitones: f64) {
        let clamped = if semitones.is_nan() {
            0.0
        } else {
            semitones.clamp(PITCH_RANGE.0, PITCH_RANGE.1)
        };
        self.pitch_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn position_frames(&self) -> u64 {
        self.position_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn set_position(&self, frame: u64) {
        self.position_frames.store(frame, Ordering::Relaxed);
    }

    /// Advance by source-rate frames consumed, wrapping at the duration
    /// when looping.
    pub(crate) fn advance_position(&self, frames: u64) {
        if frames == 0 {
            return;
        }
        let mut next = self.position_frames.load(Ordering::Relaxed) + frames;
        if self.looping() && self.duration_frames > 0 && self.duration_frames != DURATION_INFINITE {
            next %= self.duration_frames;
        }
        self.position_frames.store(next, Ordering::Relaxed);
    }

    pub(crate) fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub(crate) fn add_underrun(&self, frames: u32) {
        self.underrun_count
            .fetch_add(u64::from(frames), Ordering::Relaxed);
    }

    pub(crate) fn overrun_samples(&self) -> u64 {
        self.overrun_samples.load(Ordering::Relaxed)
    }

    pub(crate) fn add_overrun(&self, samples: u64) {
        self.overrun_samples.fetch_add(samples, Ordering::Relaxed);
    }

    pub(crate) fn request_seek(&self, frame: u64) {
        self.seek_request.store(frame, Ordering::Release);
    }

    /// Producer side: claim a pending seek request, if any.
    pub(crate) fn take_seek_request(&self) -> Option<u64> {
        let target = self.seek_request.swap(SEEK_NONE, Ordering::Acquire);
        (target != SEEK_NONE).then_some(target)
    }
}

/// Audio-thread half of a source.
pub(crate) struct SourceLane {
    pub(crate) consumer: QueueConsumer,
    pub(crate) pipeline: SourcePipeline,
    pub(crate) chain: ProcessorChain,
}

impl SourceLane {
    /// Service a pending queue flush; drops converted leftovers with it.
    pub(crate) fn service_flush(&mut self) {
        if self.consumer.service_flush() {
            self.pipeline.reset();
        }
    }
}

/// One source as the mixer sees it: control block plus lane.
pub(crate) struct SourceEntry {
    pub(crate) shared: Arc<SharedSource>,
    pub(crate) lane: Mutex<SourceLane>,
}

/// The published, insertion-ordered set of active sources.
///
/// The application swaps in a whole new vector under the mutex and bumps the
/// generation; the audio thread compares generations and `try_lock`s to pick
/// up the swap. A failed try (swap in progress) keeps the previous snapshot
/// for one callback, so the audio thread never blocks on membership changes.
pub(crate) struct SourceSet {
    generation: AtomicU64,
    active: Mutex<Arc<Vec<Arc<SourceEntry>>>>,
}

impl SourceSet {
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            active: Mutex::new(Arc::new(Vec::new())),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish a new membership list (application thread).
    pub(crate) fn publish(&self, list: Vec<Arc<SourceEntry>>) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = Arc::new(list);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Non-blocking snapshot for the audio thread.
    pub(crate) fn try_snapshot(&self) -> Option<(u64, Arc<Vec<Arc<SourceEntry>>>)> {
        let active = self.active.try_lock().ok()?;
        Some((self.generation.load(Ordering::Acquire), Arc::clone(&active)))
    }

    /// Blocking snapshot for application-side maintenance.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<SourceEntry>>> {
        Arc::clone(&self.active.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Application-facing handle to one source.
///
/// Cheap to clone; all control writes are single-word atomics visible to
/// the mixer on its next callback.
#[derive(Clone)]
pub struct SourceControl {
    pub(crate) entry: Arc<SourceEntry>,
}

impl SourceControl {
    /// The source's id.
    pub fn id(&self) -> SourceId {
        self.entry.shared.id
    }

    /// The caller-supplied name, if any.
    pub fn name(&self) -> Option<&str> {
        self.entry.shared.name.as_deref()
    }

    /// Which producer variant feeds this source.
    pub fn kind(&self) -> SourceKind {
        self.entry.shared.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SourceState {
        self.entry.shared.state()
    }

    /// Current volume in [0, 1].
    pub fn volume(&self) -> f32 {
        self.entry.shared.volume()
    }

    /// Set the volume; out-of-range values clamp, they never fail.
    pub fn set_volume(&self, volume: f32) {
        self.entry.shared.set_volume(volume);
    }

    /// Current tempo as percent change.
    pub fn tempo(&self) -> f64 {
        self.entry.shared.tempo()
    }

    /// Set the tempo percent change, clamped to [-20, +20].
    pub fn set_tempo(&self, tempo: f64) {
        self.entry.shared.set_tempo(tempo);
    }

    /// Current pitch shift in semitones.
    pub fn pitch_semitones(&self) -> f64 {
        self.entry.shared.pitch()
    }

    /// Set the pitch shift, clamped to [-6, +6] semitones.
    pub fn set_pitch_semitones(&self, semitones: f64) {
        self.entry.shared.set_pitch(semitones);
    }

    /// Whether the source rewinds at end of stream.
    pub fn looping(&self) -> bool {
        self.entry.shared.looping()
    }

    /// Enable or disable end-of-stream rewinding.
    pub fn set_looping(&self, looping: bool) {
        self.entry.shared.set_looping(looping);
    }

    /// Whether the mixer includes this source.
    pub fn enabled(&self) -> bool {
        self.entry.shared.enabled()
    }

    /// Include or exclude this source from mixing without removing it.
    pub fn set_enabled(&self, enabled: bool) {
        self.entry.shared.set_enabled(enabled);
    }

    /// Playback position in source-rate frames.
    pub fn position_frames(&self) -> u64 {
        self.entry.shared.position_frames()
    }

    /// Playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        self.entry.shared.position_frames() as f64 / f64::from(self.entry.shared.src_rate)
    }

    /// Total length in source-rate frames.
    ///
    /// Zero for input sources, [`DURATION_INFINITE`] for realtime sources.
    pub fn duration_frames(&self) -> u64 {
        self.entry.shared.duration_frames
    }

    /// Total length in seconds; `None` when the source has no defined end.
    pub fn duration_secs(&self) -> Option<f64> {
        match self.entry.shared.duration_frames {
            DURATION_INFINITE => None,
            frames => Some(frames as f64 / f64::from(self.entry.shared.src_rate)),
        }
    }

    /// Output frames this source has had zero-padded so far.
    pub fn underrun_count(&self) -> u64 {
        self.entry.shared.underrun_count()
    }

    /// Capture samples tail-dropped because this source's queue was full.
    ///
    /// Only input sources accumulate overruns; file producers block and
    /// realtime submits refuse instead.
    pub fn overrun_samples(&self) -> u64 {
        self.entry.shared.overrun_samples()
    }

    /// Request a seek to `secs`.
    ///
    /// Legal in any non-errored state for file sources; queued samples are
    /// dropped. Input and realtime sources cannot seek.
    pub fn seek(&self, secs: f64) -> Result<()> {
        if self.entry.shared.kind != SourceKind::File {
            return Err(EngineError::IllegalState(format!(
                "{} source cannot seek",
                match self.entry.shared.kind {
                    SourceKind::Input => "an input",
                    SourceKind::Realtime => "a realtime",
                    SourceKind::File => unreachable!(),
                }
            )));
        }
        if self.state() == SourceState::Errored {
            return Err(EngineError::IllegalState(
                "cannot seek an errored source".into(),
            ));
        }
        if !secs.is_finite() || secs < 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "seek target {secs} is not a non-negative time"
            )));
        }
        let frame = (secs * f64::from(self.entry.shared.src_rate)) as u64;
        self.entry.shared.request_seek(frame);
        Ok(())
    }

    /// Edit this source's processor chain.
    ///
    /// Must be called between callbacks (any time while stopped); the edit
    /// holds the lane briefly, which is the documented contract with the
    /// audio thread.
    pub fn with_chain<R>(&self, f: impl FnOnce(&mut ProcessorChain) -> R) -> R {
        let mut lane = self.entry.lane.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut lane.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::{PipelineFormat, source_queue};

    fn test_entry(kind: SourceKind) -> Arc<SourceEntry> {
        let shared = Arc::new(SharedSource::new(
            SourceId::new(1),
            Some("test".into()),
            kind,
            48000,
            2,
            480_000,
            1.0,
        ));
        let (_prod, cons) = source_queue(1024);
        Arc::new(SourceEntry {
            shared,
            lane: Mutex::new(SourceLane {
                consumer: cons,
                pipeline: SourcePipeline::new(PipelineFormat {
                    src_rate: 48000,
                    src_channels: 2,
                    out_rate: 48000,
                    out_channels: 2,
                }),
                chain: ProcessorChain::new(48000.0),
            }),
        })
    }

    #[test]
    fn numeric_controls_clamp_instead_of_failing() {
        let control = SourceControl {
            entry: test_entry(SourceKind::File),
        };

        control.set_volume(7.0);
        assert_eq!(control.volume(), 1.0);
        control.set_volume(-1.0);
        assert_eq!(control.volume(), 0.0);

        control.set_tempo(500.0);
        assert_eq!(control.tempo(), 20.0);
        control.set_tempo(-500.0);
        assert_eq!(control.tempo(), -20.0);

        control.set_pitch_semitones(24.0);
        assert_eq!(control.pitch_semitones(), 6.0);
        control.set_pitch_semitones(f64::NAN);
        assert_eq!(control.pitch_semitones(), 0.0);
    }

    #[test]
    fn seek_is_illegal_for_non_file_sources() {
        let input = SourceControl {
            entry: test_entry(SourceKind::Input),
        };
        assert!(matches!(
            input.seek(1.0),
            Err(EngineError::IllegalState(_))
        ));

        let realtime = SourceControl {
            entry: test_entry(SourceKind::Realtime),
        };
        assert!(matches!(
            realtime.seek(1.0),
            Err(EngineError::IllegalState(_))
        ));
    }

    #[test]
    fn seek_stores_a_frame_request() {
        let control = SourceControl {
            entry: test_entry(SourceKind::File),
        };
        control.seek(2.5).unwrap();
        assert_eq!(control.entry.shared.take_seek_request(), Some(120_000));
        // The slot is a single pending request, consumed on take.
        assert_eq!(control.entry.shared.take_seek_request(), None);
    }

    #[test]
    fn looping_position_wraps_at_duration() {
        let control = SourceControl {
            entry: test_entry(SourceKind::File),
        };
        let shared = &control.entry.shared;
        shared.set_looping(true);
        shared.set_position(479_000);
        shared.advance_position(2_000);
        assert_eq!(shared.position_frames(), 1_000);
    }

    #[test]
    fn source_set_publishes_generations() {
        let set = SourceSet::new();
        let before = set.generation();
        set.publish(vec![test_entry(SourceKind::File)]);
        assert!(set.generation() > before);

        let (generation, snapshot) = set.try_snapshot().unwrap();
        assert_eq!(generation, set.generation());
        assert_eq!(snapshot.len(), 1);
    }
}
