//! Audio device inspection command.

use clap::{Args, Subcommand};
use mezcla_io::{CpalBackend, DeviceBackend, HostType, initialize};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,

    /// Audio host to use (alsa, coreaudio, wasapi; platform default otherwise)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all available audio devices
    List,

    /// Show default device and subsystem status
    Info,
}

fn parse_host(host: Option<&str>) -> anyhow::Result<HostType> {
    match host {
        None => Ok(HostType::Default),
        Some(name) => match name.to_lowercase().as_str() {
            "alsa" => Ok(HostType::Alsa),
            "coreaudio" => Ok(HostType::CoreAudio),
            "wasapi" => Ok(HostType::Wasapi),
            other => anyhow::bail!("unknown host '{other}' (try alsa, coreaudio, or wasapi)"),
        },
    }
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let host = parse_host(args.host.as_deref())?;

    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let backend = CpalBackend::with_host(host)?;
            let devices = backend.list_devices()?;

            if devices.is_empty() {
                println!("No audio devices found.");
                return Ok(());
            }

            println!("Available Audio Devices");
            println!("=======================\n");

            for device in &devices {
                let mut roles = Vec::new();
                if device.max_output_channels > 0 {
                    roles.push(format!("out:{}ch", device.max_output_channels));
                }
                if device.max_input_channels > 0 {
                    roles.push(format!("in:{}ch", device.max_input_channels));
                }
                println!(
                    "  [{}] {} ({} Hz, {})",
                    device.index,
                    device.name,
                    device.default_sample_rate,
                    roles.join(", ")
                );
                if device.max_output_channels > 0 {
                    println!(
                        "      output latency {:.1}-{:.1} ms",
                        device.default_low_output_latency * 1000.0,
                        device.default_high_output_latency * 1000.0
                    );
                }
            }

            println!("\nTotal: {} device(s)", devices.len());
            println!("\nTip: pass a device index to play with --output:");
            println!("  mezcla play track.wav --output 0");
        }

        DevicesCommand::Info => {
            let status = initialize(Some(host));
            println!("Subsystems");
            println!("==========\n");
            println!("  output backend: {}", status.is_output_backend_initialized);
            println!("  input backend:  {}", status.is_input_backend_initialized);
            println!("  file decoder:   {}", status.is_file_decoder_initialized);
            println!();

            let backend = CpalBackend::with_host(host)?;
            match backend.default_output_device()? {
                Some(device) => {
                    println!("Default Output:");
                    println!("  Name: {}", device.name);
                    println!("  Sample Rate: {} Hz", device.default_sample_rate);
                    println!("  Channels: {}", device.max_output_channels);
                }
                None => println!("Default Output: None"),
            }
            match backend.default_input_device()? {
                Some(device) => {
                    println!("Default Input:");
                    println!("  Name: {}", device.name);
                    println!("  Sample Rate: {} Hz", device.default_sample_rate);
                }
                None => println!("Default Input: None"),
            }
        }
    }

    Ok(())
}
