//! Mezcla Engine - multi-source audio mixing and playback
//!
//! The engine aggregates concurrent audio sources (decoded files, live
//! capture, application-submitted streams) into one interleaved f32
//! output stream for a host device, with per-source volume, seek, tempo,
//! and pitch controls plus processor chains per source and on the master
//! bus.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mezcla_engine::{EngineConfig, SourceManager};
//!
//! let manager = SourceManager::new(EngineConfig::default());
//! let id = manager.add_file_source("intro.wav", Some("intro"))?;
//! manager.source(id).unwrap().set_volume(0.8);
//! manager.play()?;
//! ```
//!
//! # Threads
//!
//! - The **audio callback thread** (owned by the device backend) runs
//!   [`Mixer`](crate::mixer) once per block: hard real-time, no blocking
//!   I/O, scratch from the shared buffer pool.
//! - One **decode thread** per file source fills that source's queue.
//! - **Capture callbacks** produce for input sources.
//! - The **application thread** drives [`SourceManager`] and drains
//!   [`EngineEvent`]s.

mod config;
mod error;
mod events;
mod file;
mod manager;
mod mixer;
mod realtime;
mod source;

pub use config::{ChannelLayout, EngineConfig};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use manager::{SourceManager, Transport};
pub use realtime::RealtimeSourceHandle;
pub use source::{DURATION_INFINITE, SourceControl, SourceId, SourceKind, SourceState};

// The processor seam and init surface re-exported for applications that
// only depend on the engine crate.
pub use mezcla_core::{GainStage, ProcessorChain, SampleProcessor};
pub use mezcla_io::{AudioDevice, HostType, InitStatus, initialize};
