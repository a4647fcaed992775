//! File playback through the live engine.

use clap::Args;
use mezcla_engine::{
    ChannelLayout, EngineConfig, EngineEvent, SourceManager, SourceState, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Args)]
pub struct PlayArgs {
    /// WAV files to mix and play
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Volume for every source, 0.0 - 1.0
    #[arg(short, long, default_value = "1.0")]
    volume: f32,

    /// Tempo change in percent (-20 to +20)
    #[arg(short, long, default_value = "0.0")]
    tempo: f64,

    /// Pitch shift in semitones (-6 to +6)
    #[arg(short, long, default_value = "0.0")]
    pitch: f64,

    /// Loop playback until interrupted
    #[arg(short, long, alias = "repeat")]
    r#loop: bool,

    /// Output device index (system default otherwise)
    #[arg(short, long)]
    output: Option<usize>,

    /// Engine sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Buffer size in frames (larger = fewer underruns, more latency)
    #[arg(long, default_value = "1024")]
    buffer_size: u32,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let manager = SourceManager::new(EngineConfig {
        sample_rate_hz: args.sample_rate,
        channels: ChannelLayout::Stereo,
        frames_per_buffer: args.buffer_size,
        output_device_id: args.output,
        ..EngineConfig::default()
    });

    for path in &args.files {
        let name = path.file_stem().and_then(|s| s.to_str());
        let id = manager.add_file_source(path, name)?;
        let control = manager
            .source(id)
            .ok_or_else(|| anyhow::anyhow!("source vanished after add"))?;
        control.set_volume(args.volume);
        control.set_tempo(args.tempo);
        control.set_pitch_semitones(args.pitch);
        control.set_looping(args.r#loop);
        println!(
            "  {} ({:.1}s)",
            path.display(),
            control.duration_secs().unwrap_or(0.0)
        );
    }

    println!(
        "\nPlaying {} file(s) for {:.1}s{}... Press Ctrl+C to stop.\n",
        args.files.len(),
        manager.duration_secs(),
        if args.r#loop { " (looping)" } else { "" }
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    manager.play()?;

    while running.load(Ordering::SeqCst) {
        while let Some(event) = manager.poll_event() {
            match event {
                EngineEvent::BufferUnderrun { source, frames_missed } => {
                    tracing::warn!(%source, frames_missed, "buffer underrun");
                }
                EngineEvent::DecodeError { path, message, .. } => {
                    eprintln!("decode error in {}: {}", path.display(), message);
                    running.store(false, Ordering::SeqCst);
                }
                EngineEvent::DeviceError { message } => {
                    eprintln!("device error: {}", message);
                    running.store(false, Ordering::SeqCst);
                }
                EngineEvent::EndOfStream { source } => {
                    tracing::debug!(%source, "end of stream");
                }
            }
        }

        // Done when every decoder has finished (looping never finishes).
        // The queues still hold the final packets; let them drain.
        if manager.transport() == Transport::Playing
            && manager
                .sources()
                .iter()
                .all(|s| matches!(s.state(), SourceState::EndOfStream | SourceState::Errored))
        {
            std::thread::sleep(Duration::from_millis(400));
            break;
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    manager.stop()?;
    Ok(())
}
