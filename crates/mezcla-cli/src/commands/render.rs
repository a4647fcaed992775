//! Offline mixdown to a WAV file.
//!
//! Runs the whole engine against the mock backend and pumps the render
//! callback by hand, so the mix happens faster than real time with no audio
//! hardware involved.

use clap::Args;
use mezcla_engine::{
    ChannelLayout, EngineConfig, EngineEvent, SourceManager, SourceState,
};
use mezcla_io::MockBackend;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct RenderArgs {
    /// WAV files to mix
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Output WAV path
    #[arg(short, long, default_value = "mix.wav")]
    output: PathBuf,

    /// Volume for every source, 0.0 - 1.0
    #[arg(short, long, default_value = "1.0")]
    volume: f32,

    /// Tempo change in percent (-20 to +20)
    #[arg(short, long, default_value = "0.0")]
    tempo: f64,

    /// Pitch shift in semitones (-6 to +6)
    #[arg(short, long, default_value = "0.0")]
    pitch: f64,

    /// Engine sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,
}

const FRAMES_PER_BLOCK: u32 = 512;

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let (backend, driver) = MockBackend::new();
    let manager = SourceManager::with_backend(
        EngineConfig {
            sample_rate_hz: args.sample_rate,
            channels: ChannelLayout::Stereo,
            frames_per_buffer: FRAMES_PER_BLOCK,
            ..EngineConfig::default()
        },
        Box::new(backend),
    );

    for path in &args.files {
        let name = path.file_stem().and_then(|s| s.to_str());
        let id = manager.add_file_source(path, name)?;
        let control = manager
            .source(id)
            .ok_or_else(|| anyhow::anyhow!("source vanished after add"))?;
        control.set_volume(args.volume);
        control.set_tempo(args.tempo);
        control.set_pitch_semitones(args.pitch);
    }

    println!(
        "Mixing {} file(s), {:.1}s at {} Hz...",
        args.files.len(),
        manager.duration_secs(),
        args.sample_rate
    );

    manager.play()?;

    let mut mixed: Vec<f32> = Vec::new();
    let mut block = vec![0.0f32; FRAMES_PER_BLOCK as usize * 2];
    loop {
        if !driver.render(&mut block) {
            anyhow::bail!("output stream went away mid-render");
        }
        mixed.extend_from_slice(&block);

        let finished = manager
            .sources()
            .iter()
            .all(|s| matches!(s.state(), SourceState::EndOfStream | SourceState::Errored));
        if finished && block.iter().all(|&s| s == 0.0) {
            break;
        }

        // Pace the offline clock just enough for the decode workers.
        std::thread::sleep(Duration::from_micros(500));
    }
    manager.stop()?;

    while let Some(event) = manager.poll_event() {
        if let EngineEvent::DecodeError { path, message, .. } = event {
            anyhow::bail!("decode error in {}: {}", path.display(), message);
        }
    }

    // Trim the silent tail the drain loop collected.
    while mixed.len() >= 2 && mixed[mixed.len() - 2] == 0.0 && mixed[mixed.len() - 1] == 0.0 {
        mixed.truncate(mixed.len() - 2);
    }

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)?;
    for &sample in &mixed {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    println!(
        "Wrote {} ({:.1}s)",
        args.output.display(),
        mixed.len() as f64 / 2.0 / f64::from(args.sample_rate)
    );
    Ok(())
}
