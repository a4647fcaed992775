//! Pluggable device backend abstraction.
//!
//! This module defines the [`DeviceBackend`] trait, which decouples the
//! mixing engine from any specific platform audio API. The default
//! implementation wraps cpal; [`MockBackend`](crate::MockBackend) provides a
//! deterministic backend for tests and offline rendering.
//!
//! ## Design Rationale
//!
//! The trait uses boxed closures for callbacks rather than generic
//! parameters, making `DeviceBackend` object-safe and enabling runtime
//! backend selection. Stream handles are returned as [`StreamHandle`], a
//! type-erased wrapper that stops the stream on drop. This keeps
//! platform-specific types out of the engine.

use crate::Result;

/// Configuration for building one audio stream.
#[derive(Debug, Clone)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred buffer size in frames.
    pub buffer_size: u32,
    /// Number of audio channels.
    pub channels: u16,
    /// Device index from [`DeviceBackend::list_devices`]; system default
    /// when `None`.
    pub device_index: Option<usize>,
    /// Latency hint in seconds; backends that cannot honor it ignore it.
    pub latency_secs: Option<f64>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            device_index: None,
            latency_secs: None,
        }
    }
}

/// Audio device capabilities as reported by enumeration.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Stable index within one enumeration pass.
    pub index: usize,
    /// Backend-reported device name.
    pub name: String,
    /// Maximum playback channels (0 = not an output).
    pub max_output_channels: u16,
    /// Maximum capture channels (0 = not an input).
    pub max_input_channels: u16,
    /// Shortest supported output latency, in seconds.
    pub default_low_output_latency: f64,
    /// Longest typical output latency, in seconds.
    pub default_high_output_latency: f64,
    /// Shortest supported input latency, in seconds.
    pub default_low_input_latency: f64,
    /// Longest typical input latency, in seconds.
    pub default_high_input_latency: f64,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Type-erased audio stream handle.
///
/// The stream is active while this handle exists; dropping it stops
/// playback or capture. The inner value is `Box<dyn Send>`, keeping
/// backend types out of engine code.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wrap a backend-specific stream object; it lives until the handle
    /// drops.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Render callback: fill the interleaved output buffer.
///
/// Called on the backend's real-time thread. The buffer length is
/// `frames * channels`, interleaved `[L0, R0, L1, R1, ...]`.
/// Implementations must not allocate unboundedly, lock contended mutexes,
/// or perform I/O.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Capture callback: consume the interleaved input buffer.
///
/// Same real-time constraints and layout as [`OutputCallback`].
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Error callback invoked with a human-readable streaming error.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Pluggable device backend.
///
/// Object-safe: the engine holds `Box<dyn DeviceBackend>` and selects the
/// implementation at init time.
pub trait DeviceBackend: Send {
    /// Human-readable backend name (e.g., "cpal", "mock").
    fn name(&self) -> &str;

    /// List all available audio devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// The default input device, if any.
    fn default_input_device(&self) -> Result<Option<AudioDevice>>;

    /// Build an output stream; `callback` fills each render buffer.
    ///
    /// The returned [`StreamHandle`] keeps the stream alive; dropping it
    /// stops playback.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Build an input stream; `callback` receives each capture buffer.
    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        callback: InputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// The sample rate the backend will actually use for `config`.
    ///
    /// Backends that cannot honor the requested rate report the substitute
    /// here. Default: the requested rate.
    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        config.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BackendStreamConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.channels, 2);
        assert!(config.device_index.is_none());
    }

    #[test]
    fn stream_handle_debug() {
        let handle = StreamHandle::new(42u32);
        assert!(format!("{:?}", handle).contains("StreamHandle"));
    }
}
