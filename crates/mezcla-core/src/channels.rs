//! Channel-layout adaptation between source and engine formats.
//!
//! Mapping rules:
//!
//! - equal counts: straight copy
//! - mono → N: the mono sample is duplicated to every output channel
//! - N → mono: all input channels are averaged
//! - anything else: channel `i` copies to channel `i` for
//!   `i < min(c_in, c_out)`; excess output channels are silent, excess
//!   input channels are dropped

/// Output length, in samples, for adapting `input_len` samples.
pub fn adapted_len(input_len: usize, c_in: usize, c_out: usize) -> usize {
    (input_len / c_in) * c_out
}

/// Adapt interleaved frames from `c_in` to `c_out` channels.
///
/// Reads `input.len() / c_in` whole frames and writes the same number of
/// frames into `output`, which must hold at least
/// [`adapted_len`]`(input.len(), c_in, c_out)` samples.
///
/// # Panics
///
/// Panics if either channel count is zero or `output` is too short.
pub fn adapt_channels(input: &[f32], c_in: usize, output: &mut [f32], c_out: usize) {
    assert!(c_in > 0 && c_out > 0, "channel counts must be non-zero");
    let frames = input.len() / c_in;
    let out_len = frames * c_out;
    assert!(
        output.len() >= out_len,
        "output too short: {} < {}",
        output.len(),
        out_len
    );

    if c_in == c_out {
        output[..out_len].copy_from_slice(&input[..frames * c_in]);
        return;
    }

    if c_in == 1 {
        for (frame_idx, &sample) in input[..frames].iter().enumerate() {
            output[frame_idx * c_out..(frame_idx + 1) * c_out].fill(sample);
        }
        return;
    }

    if c_out == 1 {
        let scale = 1.0 / c_in as f32;
        for (frame_idx, frame) in input[..frames * c_in].chunks_exact(c_in).enumerate() {
            output[frame_idx] = frame.iter().sum::<f32>() * scale;
        }
        return;
    }

    let copied = c_in.min(c_out);
    for (frame_idx, frame) in input[..frames * c_in].chunks_exact(c_in).enumerate() {
        let out_frame = &mut output[frame_idx * c_out..(frame_idx + 1) * c_out];
        out_frame[..copied].copy_from_slice(&frame[..copied]);
        out_frame[copied..].fill(0.0);
    }
}
