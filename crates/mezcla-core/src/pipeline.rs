//! Per-source conversion pipeline: queue → channel adapt → tempo/pitch →
//! rate conversion.
//!
//! The mixer asks the pipeline for exactly one engine-format block per
//! callback; the pipeline pulls however many source-rate frames that takes
//! from the source's queue. Stage order is fixed: channel adaptation first
//! (so the DSP stages run at the engine channel count), then the phase
//! vocoder, then band-limited rate conversion.
//!
//! Every stage is bypassed when it has nothing to do. With no tempo, no
//! pitch, and matching rate and layout, queue samples are copied to the
//! output block untouched.

use crate::channels::adapt_channels;
use crate::queue::QueueConsumer;
use crate::resample::Resampler;
use crate::vocoder::{TempoPitchShifter, stretch_factor};

/// Source frames popped from the queue per conversion round.
const CHUNK_FRAMES: usize = 512;

/// Stream formats on both sides of a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineFormat {
    /// Source native sample rate in Hz.
    pub src_rate: u32,
    /// Source native channel count.
    pub src_channels: u16,
    /// Engine sample rate in Hz.
    pub out_rate: u32,
    /// Engine channel count.
    pub out_channels: u16,
}

/// What one render produced and consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderStats {
    /// Source-rate frames consumed from the queue.
    pub src_frames_consumed: u64,
    /// Output frames zero-padded because the queue ran dry.
    pub underrun_frames: u32,
}

/// Streaming converter from one source's native format to the engine format.
pub struct SourcePipeline {
    format: PipelineFormat,
    shifter: TempoPitchShifter,
    resampler: Resampler,
    tempo: f64,
    pitch: f64,
    /// Converted engine-format samples not yet claimed by a block.
    fifo: Vec<f32>,
    pop_buf: Vec<f32>,
    adapt_buf: Vec<f32>,
    stretch_buf: Vec<f32>,
}

impl SourcePipeline {
    /// Create a pipeline between the given formats.
    ///
    /// # Panics
    ///
    /// Panics if any rate or channel count is zero.
    pub fn new(format: PipelineFormat) -> Self {
        assert!(
            format.src_rate > 0 && format.out_rate > 0,
            "sample rates must be non-zero"
        );
        assert!(
            format.src_channels > 0 && format.out_channels > 0,
            "channel counts must be non-zero"
        );
        let base_ratio = f64::from(format.out_rate) / f64::from(format.src_rate);
        Self {
            format,
            shifter: TempoPitchShifter::new(format.out_channels as usize, 1.0),
            resampler: Resampler::new(format.out_channels as usize, base_ratio),
            tempo: 0.0,
            pitch: 0.0,
            fifo: Vec::new(),
            pop_buf: vec![0.0; CHUNK_FRAMES * format.src_channels as usize],
            adapt_buf: vec![0.0; CHUNK_FRAMES * format.out_channels as usize],
            stretch_buf: Vec::new(),
        }
    }

    /// The formats this pipeline converts between.
    pub fn format(&self) -> PipelineFormat {
        self.format
    }

    /// Apply tempo (percent change) and pitch (semitones).
    ///
    /// Values are expected pre-clamped by the control layer; reconfiguration
    /// only happens when either value actually changed.
    pub fn set_controls(&mut self, tempo: f64, pitch: f64) {
        if tempo == self.tempo && pitch == self.pitch {
            return;
        }
        self.tempo = tempo;
        self.pitch = pitch;
        self.shifter.set_stretch(stretch_factor(tempo, pitch));
        let base_ratio = f64::from(self.format.out_rate) / f64::from(self.format.src_rate);
        self.resampler.set_ratio(base_ratio / (pitch / 12.0).exp2());
    }

    fn shifter_active(&self) -> bool {
        self.tempo != 0.0 || self.pitch != 0.0
    }

    fn resampler_active(&self) -> bool {
        self.format.src_rate != self.format.out_rate || self.pitch != 0.0
    }

    fn fully_bypassed(&self) -> bool {
        !self.shifter_active()
            && !self.resampler_active()
            && self.format.src_channels == self.format.out_channels
    }

    /// Converted samples waiting to be claimed by a block.
    pub fn buffered_samples(&self) -> usize {
        self.fifo.len()
    }

    /// Discard converted-but-unclaimed audio and all stage state.
    ///
    /// Called when the source seeks; queued source samples are dropped by
    /// the queue flush, this drops their already-converted remainder.
    pub fn reset(&mut self) {
        self.fifo.clear();
        self.shifter.reset();
        self.resampler.reset();
    }

    /// Fill `dst` with exactly `dst.len() / out_channels` frames.
    ///
    /// Pulls from `queue` as needed; shortfalls are zero-padded and counted.
    pub fn render(&mut self, queue: &mut QueueConsumer, dst: &mut [f32]) -> RenderStats {
        let out_ch = self.format.out_channels as usize;
        debug_assert_eq!(dst.len() % out_ch, 0);

        let mut stats = RenderStats::default();

        if self.fully_bypassed() {
            // Serve any leftover from a just-disabled conversion path first.
            let from_fifo = self.fifo.len().min(dst.len());
            if from_fifo > 0 {
                dst[..from_fifo].copy_from_slice(&self.fifo[..from_fifo]);
                self.fifo.drain(..from_fifo);
            }
            let popped = queue.pop(&mut dst[from_fifo..]);
            stats.src_frames_consumed = (popped / out_ch) as u64;

            let filled = from_fifo + popped;
            dst[filled..].fill(0.0);
            stats.underrun_frames = ((dst.len() - filled) / out_ch) as u32;
            return stats;
        }

        let src_ch = self.format.src_channels as usize;
        let needed = dst.len();

        while self.fifo.len() < needed {
            let popped = queue.pop(&mut self.pop_buf);
            if popped == 0 {
                break;
            }
            let frames_in = popped / src_ch;
            stats.src_frames_consumed += frames_in as u64;

            let shifter_active = self.shifter_active();
            let resampler_active = self.resampler_active();

            let adapted = &mut self.adapt_buf[..frames_in * out_ch];
            adapt_channels(&self.pop_buf[..frames_in * src_ch], src_ch, adapted, out_ch);

            if shifter_active {
                self.stretch_buf.clear();
                self.shifter.process(adapted, &mut self.stretch_buf);
                if resampler_active {
                    self.resampler.process(&self.stretch_buf, &mut self.fifo);
                } else {
                    self.fifo.extend_from_slice(&self.stretch_buf);
                }
            } else if resampler_active {
                self.resampler.process(adapted, &mut self.fifo);
            } else {
                self.fifo.extend_from_slice(adapted);
            }
        }

        let take = self.fifo.len().min(needed);
        dst[..take].copy_from_slice(&self.fifo[..take]);
        self.fifo.drain(..take);
        dst[take..].fill(0.0);
        stats.underrun_frames = ((needed - take) / out_ch) as u32;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::source_queue;

    fn sine_wave(frequency: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    fn spectral_peak_at(signal: &[f32], freq_hz: f32, sample_rate: f32) -> f32 {
        let n = signal.len();
        let mut re = 0.0f32;
        let mut im = 0.0f32;
        for (i, &s) in signal.iter().enumerate() {
            let phase = 2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate;
            re += s * phase.cos();
            im += s * phase.sin();
        }
        (re * re + im * im).sqrt() / n as f32
    }

    fn format(src_rate: u32, src_ch: u16, out_rate: u32, out_ch: u16) -> PipelineFormat {
        PipelineFormat {
            src_rate,
            src_channels: src_ch,
            out_rate,
            out_channels: out_ch,
        }
    }

    /// Drain the whole queue through the pipeline in fixed blocks, stopping
    /// after the first block that needed padding.
    fn drain_all(pipeline: &mut SourcePipeline, queue: &mut QueueConsumer, block: usize) -> (Vec<f32>, u64) {
        let out_ch = pipeline.format().out_channels as usize;
        let mut collected = Vec::new();
        let mut consumed = 0u64;
        let mut dst = vec![0.0f32; block * out_ch];
        loop {
            let stats = pipeline.render(queue, &mut dst);
            consumed += stats.src_frames_consumed;
            let produced = block - stats.underrun_frames as usize;
            collected.extend_from_slice(&dst[..produced * out_ch]);
            if stats.underrun_frames > 0 {
                break;
            }
        }
        (collected, consumed)
    }

    #[test]
    fn bypass_is_bit_identical() {
        let (mut prod, mut cons) = source_queue(4096);
        let samples: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.001).sin()).collect();
        prod.push(&samples);

        let mut pipeline = SourcePipeline::new(format(48000, 2, 48000, 2));
        let mut dst = vec![0.0f32; 1024];
        let stats = pipeline.render(&mut cons, &mut dst);

        assert_eq!(dst, samples);
        assert_eq!(stats.src_frames_consumed, 512);
        assert_eq!(stats.underrun_frames, 0);
    }

    #[test]
    fn bypass_zero_pads_shortfall() {
        let (mut prod, mut cons) = source_queue(4096);
        prod.push(&[0.5; 20]); // 10 stereo frames

        let mut pipeline = SourcePipeline::new(format(48000, 2, 48000, 2));
        let mut dst = vec![1.0f32; 40]; // 20 frames requested
        let stats = pipeline.render(&mut cons, &mut dst);

        assert_eq!(&dst[..20], &[0.5; 20]);
        assert!(dst[20..].iter().all(|&s| s == 0.0));
        assert_eq!(stats.src_frames_consumed, 10);
        assert_eq!(stats.underrun_frames, 10);
    }

    #[test]
    fn mono_source_fills_stereo_engine() {
        let (mut prod, mut cons) = source_queue(4096);
        prod.push(&[0.25, -0.75]);

        let mut pipeline = SourcePipeline::new(format(48000, 1, 48000, 2));
        let mut dst = vec![0.0f32; 4];
        let stats = pipeline.render(&mut cons, &mut dst);

        assert_eq!(dst, [0.25, 0.25, -0.75, -0.75]);
        assert_eq!(stats.src_frames_consumed, 2);
    }

    #[test]
    fn rate_conversion_preserves_tone_and_consumption() {
        let signal = sine_wave(1000.0, 44100.0, 44100);
        let (mut prod, mut cons) = source_queue(signal.len() + 1);
        prod.push(&signal);

        let mut pipeline = SourcePipeline::new(format(44100, 1, 48000, 1));
        let (out, consumed) = drain_all(&mut pipeline, &mut cons, 512);

        assert_eq!(consumed, 44100);
        let peak = spectral_peak_at(&out[4800..], 1000.0, 48000.0);
        assert!(peak > 0.3, "1 kHz tone should survive, peak={peak}");
    }

    #[test]
    fn pitch_up_octave_moves_tone_without_duration_change() {
        let seconds = 2;
        let signal = sine_wave(440.0, 48000.0, 48000 * seconds);
        let (mut prod, mut cons) = source_queue(signal.len() + 1);
        prod.push(&signal);

        let mut pipeline = SourcePipeline::new(format(48000, 1, 48000, 1));
        pipeline.set_controls(0.0, 12.0);
        let (out, consumed) = drain_all(&mut pipeline, &mut cons, 512);

        assert_eq!(consumed, 48000 * seconds as u64);

        // Duration unchanged: stretch × resample cancels.
        let expected = (48000 * seconds) as f64;
        let ratio = out.len() as f64 / expected;
        assert!(
            (0.95..=1.05).contains(&ratio),
            "duration should be preserved, got {ratio:.3}x"
        );

        // Dominant frequency doubled.
        let analysis = &out[8192..out.len() - 4096];
        let at_880 = spectral_peak_at(analysis, 880.0, 48000.0);
        let at_440 = spectral_peak_at(analysis, 440.0, 48000.0);
        assert!(at_880 > 0.15, "880 Hz should dominate, got {at_880}");
        assert!(
            at_880 > 4.0 * at_440,
            "expected the tone an octave up: 880={at_880}, 440={at_440}"
        );
    }

    #[test]
    fn tempo_up_shortens_output() {
        let signal = sine_wave(440.0, 48000.0, 96000);
        let (mut prod, mut cons) = source_queue(signal.len() + 1);
        prod.push(&signal);

        let mut pipeline = SourcePipeline::new(format(48000, 1, 48000, 1));
        pipeline.set_controls(20.0, 0.0);
        let (out, consumed) = drain_all(&mut pipeline, &mut cons, 512);

        assert_eq!(consumed, 96000);
        let ratio = out.len() as f64 / 96000.0;
        let target = 1.0 / 1.2;
        assert!(
            (ratio - target).abs() < 0.05,
            "tempo +20% should shrink duration to ~{target:.3}, got {ratio:.3}"
        );
    }
}
