//! Mezcla Core - mixing primitives for the multi-source audio engine
//!
//! This crate provides the building blocks the engine assembles per source
//! and per callback, designed for real-time use: bounded allocation, no
//! locks on the audio path, and per-source state that survives block
//! boundaries.
//!
//! # Core Abstractions
//!
//! ## Processing
//!
//! - [`SampleProcessor`] - Object-safe trait for in-place DSP over
//!   interleaved blocks
//! - [`ProcessorChain`] - Ordered chain that runs enabled members in order
//! - [`GainStage`] - Minimal linear-gain processor
//!
//! ## Buffering
//!
//! - [`BufferPool`] - Size-bucketed, lock-free pool of zeroed scratch
//!   buffers ([`pool()`] is the process-wide instance)
//! - [`source_queue`] - Bounded SPSC sample queue between a producer thread
//!   and the mixer
//!
//! ## Format Conversion
//!
//! - [`adapt_channels`] - Channel-layout mapping
//! - [`Resampler`] - Streaming windowed-sinc rate conversion
//! - [`TempoPitchShifter`] - Phase-vocoder time stretching
//! - [`SourcePipeline`] - The per-source composition of all of the above

pub mod channels;
pub mod gain;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod resample;
pub mod vocoder;

// Re-export main types at crate root
pub use channels::{adapt_channels, adapted_len};
pub use gain::GainStage;
pub use pipeline::{PipelineFormat, RenderStats, SourcePipeline};
pub use pool::{BufferPool, pool};
pub use processor::{ProcessorChain, SampleProcessor};
pub use queue::{QueueConsumer, QueueFull, QueueProducer, source_queue};
pub use resample::Resampler;
pub use vocoder::{TempoPitchShifter, stretch_factor};
