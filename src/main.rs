//! vidpress CLI
//!
//! Compresses video files with FFmpeg, several at a time, with progress,
//! Ctrl-C cancellation and a size report at the end.
//!
//! # Usage
//!
//! ```bash
//! vidpress compress clip.mov ~/Videos --codec hevc --quality 26 --jobs 2
//! vidpress codecs
//! vidpress config
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use vidpress_cli::adapters::TracingLogAdapter;
use vidpress_cli::cli::{commands, Cli, Commands};
use vidpress_cli::config_initialization::initialize_configuration_hierarchy;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, sources) = initialize_configuration_hierarchy(&cli)?;
    TracingLogAdapter::init(&config.logging)?;
    sources.log();
    debug!(version = env!("CARGO_PKG_VERSION"), "vidpress starting");

    let result = match cli.command {
        Commands::Compress(args) => commands::compress(args, &config).await.map(|report| report.exit_code()),
        Commands::Codecs(args) => commands::codecs(args, &config).await.map(|_| ExitCode::SUCCESS),
        Commands::Config(args) => commands::show_config(args, &config).map(|_| ExitCode::SUCCESS),
    };

    if let Err(err) = &result {
        error!("Command failed: {:#}", err);
    }
    result
}
