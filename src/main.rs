// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use quietcam::backends::camera::CameraBackendType;
use quietcam::config::Config;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "quietcam")]
#[command(about = "Record camera and microphone to a file, without a preview")]
#[command(version = quietcam::constants::app_info::version())]
struct Cli {
    /// Config file (default: ~/.config/quietcam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated camera instead of V4L2
    #[arg(long, global = true)]
    simulate: bool,

    /// Record a generated tone instead of the microphone
    #[arg(long, global = true)]
    test_tone: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl+C or for a fixed duration
    Record {
        /// Recording duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Take start/stop/toggle/status/quit commands on stdin
    Serve,

    /// List recordings, newest first
    List,

    /// List cameras and microphones
    Devices,

    /// List available GStreamer encoders
    Encoders,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=quietcam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.simulate {
        config.backend = CameraBackendType::Simulated;
    }
    if cli.test_tone {
        config.audio.test_tone = true;
    }

    match cli.command {
        Commands::Record { duration } => cli::record(config, duration),
        Commands::Serve => cli::serve(config),
        Commands::List => cli::list_recordings(&config),
        Commands::Devices => cli::list_devices(),
        Commands::Encoders => cli::list_encoders(),
    }
}
