//! The per-callback mix loop.
//!
//! [`Mixer::render`] runs on the device backend's real-time thread. Its
//! obligations per callback, in order: pick up membership changes (one
//! generation check and at most one `try_lock`), service pending seek
//! flushes, pull one converted block per enabled source, run per-source
//! chains and gains, sum, run the master chain once on the sum, hard-clamp,
//! and write the device buffer.
//!
//! Scratch and accumulator blocks are rented from the process-wide
//! [`BufferPool`](mezcla_core::BufferPool) and released at the end of the
//! callback, so the steady state allocates nothing.

use crate::events::{EngineEvent, EventQueue};
use crate::source::{SourceEntry, SourceLane, SourceSet, SourceState};
use mezcla_core::pool;
use mezcla_core::ProcessorChain;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct Mixer {
    out_channels: usize,
    sources: Arc<SourceSet>,
    cached_generation: u64,
    cached: Arc<Vec<Arc<SourceEntry>>>,
    master: Arc<Mutex<ProcessorChain>>,
    events: Arc<EventQueue>,
    paused: Arc<AtomicBool>,
}

impl Mixer {
    pub(crate) fn new(
        out_channels: usize,
        sources: Arc<SourceSet>,
        master: Arc<Mutex<ProcessorChain>>,
        events: Arc<EventQueue>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        let cached = sources.snapshot();
        let cached_generation = sources.generation();
        Self {
            out_channels,
            sources,
            cached_generation,
            cached,
            master,
            events,
            paused,
        }
    }

    /// Produce one output block into `out` (`frames × channels` samples).
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        debug_assert_eq!(out.len() % self.out_channels.max(1), 0);
        self.refresh_sources();

        let entries = Arc::clone(&self.cached);

        // Seek flushes progress even while paused, so a seek issued during
        // pause is clean by the time playback resumes.
        for entry in entries.iter() {
            let mut lane = entry.lane.lock().unwrap_or_else(|e| e.into_inner());
            lane.service_flush();
        }

        if self.paused.load(Ordering::Relaxed) {
            out.fill(0.0);
            return;
        }

        let len = out.len();
        if len == 0 {
            return;
        }

        let pool = pool();
        let mut mix = pool.rent(len);
        let mut scratch = pool.rent(len);
        // Pool buffers arrive zeroed; `mix` is the accumulator as-is.

        for entry in entries.iter() {
            self.mix_source(entry, &mut scratch[..len], &mut mix[..len]);
        }

        {
            let mut master = self.master.lock().unwrap_or_else(|e| e.into_inner());
            master.process(&mut mix[..len]);
        }

        for sample in &mut mix[..len] {
            *sample = sample.clamp(-1.0, 1.0);
        }
        out.copy_from_slice(&mix[..len]);

        pool.release(mix);
        pool.release(scratch);
    }

    /// Pull, process, and accumulate one source.
    fn mix_source(&self, entry: &SourceEntry, scratch: &mut [f32], mix: &mut [f32]) {
        let shared = &entry.shared;
        if !shared.enabled() {
            return;
        }

        let state = shared.state();
        match state {
            SourceState::Idle | SourceState::Paused | SourceState::Errored => return,
            SourceState::Buffering
            | SourceState::Playing
            | SourceState::EndOfStream => {}
        }

        let mut lane = entry.lane.lock().unwrap_or_else(|e| e.into_inner());
        let SourceLane {
            consumer,
            pipeline,
            chain,
        } = &mut *lane;

        match state {
            SourceState::Buffering => {
                // Not an underrun until the source has delivered once.
                if consumer.is_empty() {
                    return;
                }
                shared.set_state(SourceState::Playing);
            }
            SourceState::EndOfStream => {
                // Drain the converted tail, then go quiet.
                if consumer.is_empty() && pipeline.buffered_samples() == 0 {
                    return;
                }
            }
            _ => {}
        }

        pipeline.set_controls(shared.tempo(), shared.pitch());
        let stats = pipeline.render(consumer, scratch);

        if stats.underrun_frames > 0 && shared.state() == SourceState::Playing {
            shared.add_underrun(stats.underrun_frames);
            self.events.push(EngineEvent::BufferUnderrun {
                source: shared.id,
                frames_missed: stats.underrun_frames,
            });
        }

        chain.process(scratch);

        let volume = shared.volume();
        if volume != 1.0 {
            for sample in scratch.iter_mut() {
                *sample *= volume;
            }
        }

        for (acc, sample) in mix.iter_mut().zip(scratch.iter()) {
            *acc += *sample;
        }

        shared.advance_position(stats.src_frames_consumed);
    }

    /// Adopt a published membership change, without ever blocking.
    fn refresh_sources(&mut self) {
        if self.sources.generation() == self.cached_generation {
            return;
        }
        if let Some((generation, snapshot)) = self.sources.try_snapshot() {
            self.cached_generation = generation;
            self.cached = snapshot;
        }
        // A failed try means the application is mid-swap; the previous
        // snapshot serves for one more callback.
    }
}
