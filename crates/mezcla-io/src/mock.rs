//! Deterministic device backend for tests and offline rendering.
//!
//! [`MockBackend`] implements [`DeviceBackend`] without touching any
//! platform API: streams are driven manually through the paired
//! [`MockDriver`], which invokes the installed callbacks from whatever
//! thread the caller pleases. This makes engine behavior reproducible in CI
//! and lets the CLI render a mix faster than real time.
//!
//! ```rust
//! use mezcla_io::{BackendStreamConfig, DeviceBackend, MockBackend};
//!
//! let (backend, driver) = MockBackend::new();
//! let stream = backend
//!     .build_output_stream(
//!         &BackendStreamConfig::default(),
//!         Box::new(|buffer: &mut [f32]| buffer.fill(0.25)),
//!         Box::new(|_| {}),
//!     )
//!     .unwrap();
//!
//! let mut buffer = vec![0.0f32; 64];
//! assert!(driver.render(&mut buffer));
//! assert_eq!(buffer[0], 0.25);
//! drop(stream);
//! assert!(!driver.render(&mut buffer));
//! ```

use crate::backend::{
    AudioDevice, BackendStreamConfig, DeviceBackend, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
use crate::{Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockShared {
    output: Mutex<Option<OutputCallback>>,
    input: Mutex<Option<InputCallback>>,
}

/// Backend whose streams are driven by a [`MockDriver`].
pub struct MockBackend {
    shared: Arc<MockShared>,
}

/// Manual clock for a [`MockBackend`]'s streams.
#[derive(Clone)]
pub struct MockDriver {
    shared: Arc<MockShared>,
}

impl MockBackend {
    /// Create a backend and the driver that pumps its streams.
    pub fn new() -> (Self, MockDriver) {
        let shared = Arc::new(MockShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockDriver { shared },
        )
    }

    fn device() -> AudioDevice {
        AudioDevice {
            index: 0,
            name: "mock".to_string(),
            max_output_channels: 2,
            max_input_channels: 2,
            default_low_output_latency: 0.005,
            default_high_output_latency: 0.05,
            default_low_input_latency: 0.005,
            default_high_input_latency: 0.05,
            default_sample_rate: 48000,
        }
    }
}

impl MockDriver {
    /// Invoke the active render callback on `buffer`.
    ///
    /// Returns false (and leaves the buffer untouched) when no output
    /// stream is active.
    pub fn render(&self, buffer: &mut [f32]) -> bool {
        let mut slot = self.shared.output.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut() {
            Some(callback) => {
                callback(buffer);
                true
            }
            None => false,
        }
    }

    /// Deliver `data` to the active capture callback.
    ///
    /// Returns false when no input stream is active.
    pub fn capture(&self, data: &[f32]) -> bool {
        let mut slot = self.shared.input.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut() {
            Some(callback) => {
                callback(data);
                true
            }
            None => false,
        }
    }

    /// Whether an output stream is currently installed.
    pub fn output_active(&self) -> bool {
        self.shared.output.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Whether an input stream is currently installed.
    pub fn input_active(&self) -> bool {
        self.shared.input.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

/// Clears the output slot when the stream handle drops.
struct OutputStreamGuard {
    shared: Arc<MockShared>,
}

impl Drop for OutputStreamGuard {
    fn drop(&mut self) {
        self.shared.output.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Clears the input slot when the stream handle drops.
struct InputStreamGuard {
    shared: Arc<MockShared>,
}

impl Drop for InputStreamGuard {
    fn drop(&mut self) {
        self.shared.input.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl DeviceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(vec![Self::device()])
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(Some(Self::device()))
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        Ok(Some(Self::device()))
    }

    fn build_output_stream(
        &self,
        _config: &BackendStreamConfig,
        callback: OutputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut slot = self.shared.output.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(Error::Stream("mock output stream already active".into()));
        }
        *slot = Some(callback);
        Ok(StreamHandle::new(OutputStreamGuard {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn build_input_stream(
        &self,
        _config: &BackendStreamConfig,
        callback: InputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut slot = self.shared.input.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(Error::Stream("mock input stream already active".into()));
        }
        *slot = Some(callback);
        Ok(StreamHandle::new(InputStreamGuard {
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_drives_installed_callback() {
        let (backend, driver) = MockBackend::new();
        let stream = backend
            .build_output_stream(
                &BackendStreamConfig::default(),
                Box::new(|buffer: &mut [f32]| buffer.fill(1.0)),
                Box::new(|_| {}),
            )
            .unwrap();

        let mut buffer = vec![0.0f32; 16];
        assert!(driver.render(&mut buffer));
        assert!(buffer.iter().all(|&s| s == 1.0));

        drop(stream);
        assert!(!driver.render(&mut buffer));
    }

    #[test]
    fn second_output_stream_is_refused() {
        let (backend, _driver) = MockBackend::new();
        let _first = backend
            .build_output_stream(
                &BackendStreamConfig::default(),
                Box::new(|_| {}),
                Box::new(|_| {}),
            )
            .unwrap();
        let second = backend.build_output_stream(
            &BackendStreamConfig::default(),
            Box::new(|_| {}),
            Box::new(|_| {}),
        );
        assert!(second.is_err());
    }

    #[test]
    fn capture_feeds_input_callback() {
        let (backend, driver) = MockBackend::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let _stream = backend
            .build_input_stream(
                &BackendStreamConfig::default(),
                Box::new(move |data: &[f32]| {
                    sink.lock().unwrap().extend_from_slice(data);
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        assert!(driver.capture(&[0.1, 0.2]));
        assert_eq!(*received.lock().unwrap(), vec![0.1, 0.2]);
    }
}
