//! Streaming band-limited sample-rate conversion.
//!
//! Converts one source's interleaved stream to the engine rate by
//! windowed-sinc interpolation: a phase accumulator walks the input at
//! `1 / ratio` frames per output frame, and each output sample is the dot
//! product of a precomputed Blackman-windowed sinc branch with the
//! surrounding input frames.
//!
//! The kernel is the classic windowed-sinc lowpass
//! `h[u] = sinc(cutoff · u) · w[u]`, tabulated at [`NUM_PHASES`] fractional
//! offsets and normalized per branch to unity DC gain. The cutoff leaves a
//! 10% guard band below the narrower of the two Nyquist frequencies.
//!
//! Unlike an offline converter, the resampler keeps per-source history
//! across calls so block boundaries are seamless; [`reset`](Resampler::reset)
//! discards that history. The conversion ratio is steerable at runtime
//! (pitch shifting divides it) without rebuilding the table; the nominal
//! guard band absorbs the ±6 semitone steering range.
//!
//! Reference: P. P. Vaidyanathan, *Multirate Systems and Filter Banks*,
//! Prentice Hall, 1993, Chapter 4.

use std::f64::consts::PI;

/// Taps per polyphase branch.
const TAPS: usize = 24;
const HALF: usize = TAPS / 2;

/// Tabulated fractional offsets.
const NUM_PHASES: usize = 256;

/// Streaming windowed-sinc resampler for one interleaved stream.
pub struct Resampler {
    channels: usize,
    /// Output frames per input frame.
    ratio: f64,
    /// Input frames consumed per output frame (`1 / ratio`).
    step: f64,
    /// `NUM_PHASES × TAPS` kernel branches, phase-major.
    table: Vec<f32>,
    /// Interleaved history + unconsumed input frames.
    pending: Vec<f32>,
    /// Fractional read position within `pending`, in frames.
    t: f64,
}

impl Resampler {
    /// Create a resampler producing `ratio` output frames per input frame.
    ///
    /// The anti-imaging table is designed for this nominal ratio; later
    /// [`set_ratio`](Self::set_ratio) calls steer the phase step only.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero or `ratio` is not positive and finite.
    pub fn new(channels: usize, ratio: f64) -> Self {
        assert!(channels > 0, "channels must be non-zero");
        assert!(
            ratio.is_finite() && ratio > 0.0,
            "ratio must be positive and finite"
        );
        let mut resampler = Self {
            channels,
            ratio,
            step: 1.0 / ratio,
            table: build_table(ratio),
            pending: Vec::new(),
            t: 0.0,
        };
        resampler.reset();
        resampler
    }

    /// Current conversion ratio (output frames per input frame).
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Steer the conversion ratio without rebuilding the kernel table.
    pub fn set_ratio(&mut self, ratio: f64) {
        assert!(
            ratio.is_finite() && ratio > 0.0,
            "ratio must be positive and finite"
        );
        self.ratio = ratio;
        self.step = 1.0 / ratio;
    }

    /// Discard all history; the next call starts a fresh stream.
    pub fn reset(&mut self) {
        self.pending.clear();
        // Prime with silent left context so the first real frame is
        // interpolable immediately.
        self.pending.resize(HALF * self.channels, 0.0);
        self.t = HALF as f64;
    }

    /// Upper bound on input frames needed to emit `out_frames` more frames.
    pub fn input_frames_for(&self, out_frames: usize) -> usize {
        (out_frames as f64 * self.step).ceil() as usize + TAPS
    }

    /// Feed interleaved input frames and append converted frames to `out`.
    ///
    /// Emits every output frame whose interpolation window is complete;
    /// the remainder stays buffered for the next call.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(input.len() % self.channels, 0);
        self.pending.extend_from_slice(input);

        let frames = self.pending.len() / self.channels;
        loop {
            let base = self.t.floor();
            let center = base as usize;
            if center + HALF >= frames {
                break;
            }

            let frac = self.t - base;
            let phase = ((frac * NUM_PHASES as f64) as usize).min(NUM_PHASES - 1);
            let taps = &self.table[phase * TAPS..(phase + 1) * TAPS];
            let first = center + 1 - HALF;

            for ch in 0..self.channels {
                let mut acc = 0.0f32;
                for (j, &coeff) in taps.iter().enumerate() {
                    acc += coeff * self.pending[(first + j) * self.channels + ch];
                }
                out.push(acc);
            }
            self.t += self.step;
        }

        // Retain only the frames a future window can still touch.
        let keep_from = (self.t.floor() as usize).saturating_sub(HALF - 1);
        if keep_from > 0 {
            self.pending.drain(..keep_from * self.channels);
            self.t -= keep_from as f64;
        }
    }
}

/// Build the phase-major kernel table for the nominal ratio.
///
/// Each branch is normalized to sum 1.0, so DC passes at exactly unity gain
/// regardless of phase.
fn build_table(ratio: f64) -> Vec<f32> {
    let cutoff = 0.9 * ratio.min(1.0);
    let mut table = Vec::with_capacity(NUM_PHASES * TAPS);

    for phase in 0..NUM_PHASES {
        let frac = phase as f64 / NUM_PHASES as f64;
        let start = table.len();
        let mut sum = 0.0f64;

        for j in 0..TAPS {
            // Offset of input sample j from the interpolation point.
            let u = (j as f64 + 1.0 - HALF as f64) - frac;

            let sinc = if u.abs() < 1e-9 {
                1.0
            } else {
                (PI * cutoff * u).sin() / (PI * cutoff * u)
            };
            // Centered Blackman taper over [-HALF, HALF].
            let window =
                0.42 + 0.5 * (PI * u / HALF as f64).cos() + 0.08 * (2.0 * PI * u / HALF as f64).cos();

            let h = sinc * window;
            sum += h;
            table.push(h as f32);
        }

        if sum.abs() > 1e-12 {
            let norm = (1.0 / sum) as f32;
            for coeff in &mut table[start..] {
                *coeff *= norm;
            }
        }
    }

    table
}
