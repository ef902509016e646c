// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "pocketcam")]
#[command(about = "Capture and power core for a handheld touchscreen camera")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: ~/.config/pocketcam/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the appliance (default). Reads commands from stdin, one per line.
    Run,

    /// Take a single still photo
    Photo {
        /// Output file path (default: next name in the photos directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print sensor readings
    Sensors {
        /// How long to sample, in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the whole configuration
    Show,

    /// Set one value, e.g. `config set flash mode '"auto"'`
    Set {
        section: String,
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warn, or info with --verbose
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(pocketcam::config::default_config_path);

    match cli.command {
        None | Some(Commands::Run) => cli::run(&config_path),
        Some(Commands::Photo { output }) => cli::take_photo(&config_path, output),
        Some(Commands::Sensors { duration }) => cli::print_sensors(&config_path, duration),
        Some(Commands::Config { action }) => match action {
            ConfigCommand::Show => cli::show_config(&config_path),
            ConfigCommand::Set {
                section,
                key,
                value,
            } => cli::set_config(&config_path, &section, &key, &value),
        },
    }
}
