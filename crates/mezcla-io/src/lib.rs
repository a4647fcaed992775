//! Device and file I/O layer for the mezcla audio engine.
//!
//! This crate provides:
//!
//! - **Device backends**: the [`DeviceBackend`] trait with a cpal
//!   implementation ([`CpalBackend`]) and a deterministic test/offline
//!   implementation ([`MockBackend`])
//! - **Device enumeration**: [`AudioDevice`] descriptions with channel and
//!   latency capabilities
//! - **File decoding**: the [`FileDecoder`] trait and the bundled
//!   [`WavDecoder`]
//! - **Subsystem init**: [`initialize`] probes the chosen host and reports
//!   per-subsystem flags
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mezcla_io::{CpalBackend, DeviceBackend, BackendStreamConfig};
//!
//! let backend = CpalBackend::new()?;
//! let stream = backend.build_output_stream(
//!     &BackendStreamConfig::default(),
//!     Box::new(|buffer: &mut [f32]| buffer.fill(0.0)),
//!     Box::new(|err| tracing::error!(error = err, "stream error")),
//! )?;
//! // Plays until `stream` is dropped.
//! ```

pub mod backend;
pub mod cpal_backend;
pub mod decoder;
pub mod mock;

pub use backend::{
    AudioDevice, BackendStreamConfig, DeviceBackend, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
pub use cpal_backend::{CpalBackend, HostType};
pub use decoder::{FileDecoder, WavDecoder, open_decoder};
pub use mock::{MockBackend, MockDriver};

/// Error types for device and file I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The requested audio host is not available on this system.
    #[error("Audio host unavailable: {0}")]
    HostUnavailable(String),

    /// The file's container or encoding is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which backend subsystems came up during [`initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitStatus {
    /// An output device backend is loaded and sees a default device.
    pub is_output_backend_initialized: bool,
    /// An input device backend is loaded and sees a default device.
    pub is_input_backend_initialized: bool,
    /// The bundled file decoder set is available.
    pub is_file_decoder_initialized: bool,
}

impl InitStatus {
    /// Whether playback is possible at all.
    pub fn is_ready(&self) -> bool {
        self.is_output_backend_initialized
    }
}

/// Probe the chosen audio host and report what initialized.
///
/// Passing `None` selects the platform default host (ALSA on Linux,
/// CoreAudio on macOS, WASAPI on Windows). A missing host or device is
/// reported through the flags, not as an error.
pub fn initialize(host: Option<HostType>) -> InitStatus {
    let mut status = InitStatus {
        // WAV decoding is compiled in; nothing to probe.
        is_file_decoder_initialized: true,
        ..InitStatus::default()
    };

    let backend = match CpalBackend::with_host(host.unwrap_or(HostType::Default)) {
        Ok(backend) => backend,
        Err(err) => {
            tracing::warn!(error = %err, "audio host failed to initialize");
            return status;
        }
    };

    status.is_output_backend_initialized =
        matches!(backend.default_output_device(), Ok(Some(_)));
    status.is_input_backend_initialized = matches!(backend.default_input_device(), Ok(Some(_)));

    tracing::info!(
        output = status.is_output_backend_initialized,
        input = status.is_input_backend_initialized,
        "audio subsystems initialized"
    );
    status
}
