//! Mezcla CLI - command-line interface for the mezcla mixing engine.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mezcla")]
#[command(author, version, about = "Mezcla audio mixing engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List and inspect audio devices
    Devices(commands::devices::DevicesArgs),

    /// Play audio files through the engine
    Play(commands::play::PlayArgs),

    /// Mix audio files offline into a WAV
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Render(args) => commands::render::run(args),
    }
}
