//! cpal-based device backend implementation.
//!
//! [`CpalBackend`] is the default [`DeviceBackend`], wrapping
//! [cpal](https://crates.io/crates/cpal) for cross-platform audio I/O:
//! ALSA (Linux), CoreAudio (macOS/iOS), WASAPI (Windows), Oboe (Android).
//! A specific host can be requested with [`HostType`]; [`HostType::Default`]
//! picks the platform's native API.

use crate::backend::{
    AudioDevice, BackendStreamConfig, DeviceBackend, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Host, SupportedStreamConfig};

/// Host audio API selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    /// The platform's native API (ALSA, CoreAudio, WASAPI, ...).
    Default,
    /// Linux ALSA.
    Alsa,
    /// macOS / iOS CoreAudio.
    CoreAudio,
    /// Windows WASAPI.
    Wasapi,
}

impl HostType {
    /// Substring this host's cpal id name matches, lowercased.
    fn match_key(self) -> Option<&'static str> {
        match self {
            HostType::Default => None,
            HostType::Alsa => Some("alsa"),
            HostType::CoreAudio => Some("coreaudio"),
            HostType::Wasapi => Some("wasapi"),
        }
    }
}

/// Fallback latency hints for devices that do not report a buffer range.
const FALLBACK_LOW_LATENCY: f64 = 0.01;
const FALLBACK_HIGH_LATENCY: f64 = 0.1;

/// cpal-based device backend.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Create a backend on the platform's default audio host.
    pub fn new() -> Result<Self> {
        Self::with_host(HostType::Default)
    }

    /// Create a backend on a specific audio host.
    ///
    /// Returns [`Error::HostUnavailable`] when the host is not present on
    /// this system (e.g. WASAPI on Linux).
    pub fn with_host(host_type: HostType) -> Result<Self> {
        let host = match host_type.match_key() {
            None => cpal::default_host(),
            Some(key) => {
                let id = cpal::available_hosts()
                    .into_iter()
                    .find(|id| id.name().to_lowercase().contains(key))
                    .ok_or_else(|| Error::HostUnavailable(format!("{host_type:?}")))?;
                cpal::host_from_id(id).map_err(|e| Error::HostUnavailable(e.to_string()))?
            }
        };
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Ok(Self { host })
    }

    /// Resolve an output device from an enumeration index, or the default.
    fn find_output_device(&self, index: Option<usize>) -> Result<cpal::Device> {
        match index {
            Some(idx) => {
                let wanted = self
                    .list_devices()?
                    .into_iter()
                    .nth(idx)
                    .ok_or_else(|| Error::DeviceNotFound(format!("index {idx}")))?;
                let devices = self
                    .host
                    .output_devices()
                    .map_err(|e| Error::Stream(e.to_string()))?;
                for device in devices {
                    if device.name().map(|n| n == wanted.name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(Error::DeviceNotFound(wanted.name))
            }
            None => self.host.default_output_device().ok_or(Error::NoDevice),
        }
    }

    /// Resolve an input device from an enumeration index, or the default.
    fn find_input_device(&self, index: Option<usize>) -> Result<cpal::Device> {
        match index {
            Some(idx) => {
                let wanted = self
                    .list_devices()?
                    .into_iter()
                    .nth(idx)
                    .ok_or_else(|| Error::DeviceNotFound(format!("index {idx}")))?;
                let devices = self
                    .host
                    .input_devices()
                    .map_err(|e| Error::Stream(e.to_string()))?;
                for device in devices {
                    if device.name().map(|n| n == wanted.name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(Error::DeviceNotFound(wanted.name))
            }
            None => self.host.default_input_device().ok_or(Error::NoDevice),
        }
    }

    fn describe(&self, device: &cpal::Device, index: usize) -> Option<AudioDevice> {
        let name = device.name().ok()?;
        let output_config = device.default_output_config().ok();
        let input_config = device.default_input_config().ok();
        if output_config.is_none() && input_config.is_none() {
            return None;
        }

        let default_sample_rate = output_config
            .as_ref()
            .or(input_config.as_ref())
            .map(|c| c.sample_rate())
            .unwrap_or(48000);

        let (low_out, high_out) = latency_range(output_config.as_ref());
        let (low_in, high_in) = latency_range(input_config.as_ref());

        Some(AudioDevice {
            index,
            name,
            max_output_channels: output_config.as_ref().map_or(0, |c| c.channels()),
            max_input_channels: input_config.as_ref().map_or(0, |c| c.channels()),
            default_low_output_latency: low_out,
            default_high_output_latency: high_out,
            default_low_input_latency: low_in,
            default_high_input_latency: high_in,
            default_sample_rate,
        })
    }

    fn stream_config(&self, config: &BackendStreamConfig) -> cpal::StreamConfig {
        let buffer_size = if config.buffer_size > 0 {
            cpal::BufferSize::Fixed(config.buffer_size)
        } else if let Some(latency) = config.latency_secs {
            cpal::BufferSize::Fixed((latency * f64::from(config.sample_rate)).max(1.0) as u32)
        } else {
            cpal::BufferSize::Default
        };
        cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size,
        }
    }
}

/// Derive latency hints from a device config's buffer size range.
fn latency_range(config: Option<&SupportedStreamConfig>) -> (f64, f64) {
    let Some(config) = config else {
        return (0.0, 0.0);
    };
    let rate = f64::from(config.sample_rate()).max(1.0);
    match *config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if min > 0 => {
            (f64::from(min) / rate, (f64::from(max) / rate).min(1.0))
        }
        _ => (FALLBACK_LOW_LATENCY, FALLBACK_HIGH_LATENCY),
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        let mut devices: Vec<AudioDevice> = Vec::new();

        if let Ok(outputs) = self.host.output_devices() {
            for device in outputs {
                if let Some(info) = self.describe(&device, devices.len()) {
                    devices.push(info);
                }
            }
        }

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                let Some(info) = self.describe(&device, devices.len()) else {
                    continue;
                };
                // Duplex devices already appeared in the output pass.
                if devices.iter().any(|d| d.name == info.name) {
                    continue;
                }
                devices.push(info);
            }
        }

        Ok(devices)
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self
            .host
            .default_output_device()
            .and_then(|d| self.describe(&d, 0)))
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self
            .host
            .default_input_device()
            .and_then(|d| self.describe(&d, 0)))
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_output_device(config.device_index)?;
        let stream_config = self.stream_config(config);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            "output stream started"
        );

        Ok(StreamHandle::new(stream))
    }

    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: InputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_input_device(config.device_index)?;
        let stream_config = self.stream_config(config);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            "input stream started"
        );

        Ok(StreamHandle::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name() {
        if let Ok(backend) = CpalBackend::new() {
            assert_eq!(backend.name(), "cpal");
        }
    }

    #[test]
    fn list_devices_does_not_panic() {
        // Device availability depends on the system; only the call contract
        // is asserted here.
        if let Ok(backend) = CpalBackend::new() {
            let result = backend.list_devices();
            assert!(result.is_ok());
        }
    }

    #[test]
    fn missing_host_is_reported() {
        // At most one of these exists on any given platform.
        let alsa = CpalBackend::with_host(HostType::Alsa);
        let wasapi = CpalBackend::with_host(HostType::Wasapi);
        assert!(alsa.is_err() || wasapi.is_err());
    }
}
