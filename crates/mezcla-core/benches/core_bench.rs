//! Criterion benchmarks for mezcla-core conversion primitives
//!
//! Run with: cargo bench -p mezcla-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mezcla_core::{BufferPool, Resampler, TempoPitchShifter, adapt_channels};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[256, 512, 1024];

fn generate_test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("rent_release", block_size),
            &block_size,
            |b, &size| {
                let pool = BufferPool::new();
                // Warm the bucket so the steady state is measured.
                pool.release(pool.rent(size));
                b.iter(|| {
                    let buf = pool.rent(black_box(size));
                    pool.release(buf);
                });
            },
        );
    }
    group.finish();
}

fn bench_resampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resampler");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("44100_to_48000", block_size),
            &block_size,
            |b, _| {
                let mut resampler = Resampler::new(1, 48000.0 / 44100.0);
                let mut out = Vec::with_capacity(2 * block_size);
                b.iter(|| {
                    out.clear();
                    resampler.process(black_box(&input), &mut out);
                    black_box(out.len());
                });
            },
        );
    }
    group.finish();
}

fn bench_vocoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("TempoPitchShifter");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("stretch_1_25", block_size),
            &block_size,
            |b, _| {
                let mut shifter = TempoPitchShifter::new(1, 1.25);
                let mut out = Vec::with_capacity(4 * block_size);
                b.iter(|| {
                    out.clear();
                    shifter.process(black_box(&input), &mut out);
                    black_box(out.len());
                });
            },
        );
    }
    group.finish();
}

fn bench_channel_adapt(c: &mut Criterion) {
    let mut group = c.benchmark_group("adapt_channels");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);
        let mut output = vec![0.0f32; block_size * 2];

        group.bench_with_input(
            BenchmarkId::new("mono_to_stereo", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    adapt_channels(black_box(&input), 1, &mut output, 2);
                    black_box(output[0]);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_pool,
    bench_resampler,
    bench_vocoder,
    bench_channel_adapt
);
criterion_main!(benches);
