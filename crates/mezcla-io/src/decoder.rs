//! Streaming file decoding behind the [`FileDecoder`] trait.
//!
//! Decoders yield interleaved f32 PCM at the file's native rate and channel
//! count; the engine adapts from there. [`WavDecoder`] is the bundled
//! implementation; [`open_decoder`] dispatches on the file extension so new
//! containers slot in without touching call sites.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Streaming decoder producing interleaved f32 frames.
pub trait FileDecoder: Send {
    /// Number of interleaved channels.
    fn channels(&self) -> u16;

    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Total length in frames.
    fn duration_frames(&self) -> u64;

    /// Decode into `dst`, returning the number of whole frames written.
    ///
    /// Zero frames means end of stream. Only whole frames are written; a
    /// `dst` shorter than one frame reads nothing.
    fn read(&mut self, dst: &mut [f32]) -> Result<usize>;

    /// Reposition so the next [`read`](Self::read) starts at `frame`.
    fn seek(&mut self, frame: u64) -> Result<()>;
}

impl std::fmt::Debug for dyn FileDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDecoder").finish()
    }
}

/// Open the decoder matching the file's extension.
pub fn open_decoder<P: AsRef<Path>>(path: P) -> Result<Box<dyn FileDecoder>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    if extension.eq_ignore_ascii_case("wav") {
        Ok(Box::new(WavDecoder::open(path)?))
    } else {
        Err(Error::UnsupportedFormat(format!(
            "no decoder for '{}' files",
            extension
        )))
    }
}

/// WAV decoder over [hound](https://crates.io/crates/hound).
pub struct WavDecoder {
    reader: WavReader<BufReader<File>>,
    channels: u16,
    sample_rate: u32,
    duration_frames: u64,
    sample_format: SampleFormat,
    /// Full-scale value for integer formats.
    int_scale: f32,
}

impl WavDecoder {
    /// Open a WAV file for streaming.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let total_samples = u64::from(reader.len());
        let duration_frames = total_samples / u64::from(spec.channels);

        Ok(Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            duration_frames,
            sample_format: spec.sample_format,
            int_scale: (1i64 << (spec.bits_per_sample - 1)) as f32,
            reader,
        })
    }
}

impl FileDecoder for WavDecoder {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration_frames(&self) -> u64 {
        self.duration_frames
    }

    fn read(&mut self, dst: &mut [f32]) -> Result<usize> {
        let channels = self.channels as usize;
        let max_samples = (dst.len() / channels) * channels;
        if max_samples == 0 {
            return Ok(0);
        }

        let mut written = 0;
        match self.sample_format {
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>() {
                    dst[written] = sample?;
                    written += 1;
                    if written == max_samples {
                        break;
                    }
                }
            }
            SampleFormat::Int => {
                let scale = self.int_scale;
                for sample in self.reader.samples::<i32>() {
                    dst[written] = sample? as f32 / scale;
                    written += 1;
                    if written == max_samples {
                        break;
                    }
                }
            }
        }

        // A trailing partial frame in a truncated file is dropped.
        Ok(written / channels)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let frame = frame.min(self.duration_frames);
        self.reader.seek(frame as u32)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_fixture(channels: u16, bits: u16, frames: usize) -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels,
            sample_rate: 48000,
            bits_per_sample: bits,
            sample_format: if bits == 32 {
                hound::SampleFormat::Float
            } else {
                hound::SampleFormat::Int
            },
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for frame in 0..frames {
            for ch in 0..channels {
                let value = (frame as f32 / frames as f32) * if ch == 0 { 1.0 } else { -1.0 };
                if bits == 32 {
                    writer.write_sample(value).unwrap();
                } else {
                    writer.write_sample((value * 16384.0) as i16).unwrap();
                }
            }
        }
        writer.finalize().unwrap();
        file
    }

    #[test]
    fn metadata_matches_fixture() {
        let file = write_fixture(2, 32, 1000);
        let decoder = WavDecoder::open(file.path()).unwrap();
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.sample_rate(), 48000);
        assert_eq!(decoder.duration_frames(), 1000);
    }

    #[test]
    fn reads_in_packets_until_eof() {
        let file = write_fixture(2, 32, 1000);
        let mut decoder = WavDecoder::open(file.path()).unwrap();

        let mut total = 0usize;
        let mut buf = vec![0.0f32; 256 * 2];
        loop {
            let frames = decoder.read(&mut buf).unwrap();
            if frames == 0 {
                break;
            }
            total += frames;
        }
        assert_eq!(total, 1000);
    }

    #[test]
    fn int_samples_are_scaled_to_unit_range() {
        let file = write_fixture(1, 16, 100);
        let mut decoder = WavDecoder::open(file.path()).unwrap();
        let mut buf = vec![0.0f32; 100];
        let frames = decoder.read(&mut buf).unwrap();
        assert_eq!(frames, 100);
        assert!(buf.iter().all(|&s| (-1.0..=1.0).contains(&s)));
        // Mid-file sample should be roughly frame/frames * 0.5 full scale.
        assert!((buf[50] - 0.25).abs() < 0.01);
    }

    #[test]
    fn seek_repositions_the_stream() {
        let file = write_fixture(1, 32, 1000);
        let mut decoder = WavDecoder::open(file.path()).unwrap();

        decoder.seek(500).unwrap();
        let mut buf = [0.0f32; 4];
        decoder.read(&mut buf).unwrap();
        assert!((buf[0] - 0.5).abs() < 1e-3);

        // Seeking past the end clamps; the next read hits EOF.
        decoder.seek(5000).unwrap();
        let mut buf = [0.0f32; 4];
        assert_eq!(decoder.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn unknown_extension_is_refused() {
        let err = open_decoder("music.ogg").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
