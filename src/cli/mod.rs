//! CLI module for vidpress
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;
pub mod report;

/// vidpress batch video compressor
///
/// Compresses video files with FFmpeg, one supervised engine process per
/// file, with progress, cancellation and a size report.
#[derive(Parser, Debug)]
#[command(name = "vidpress")]
#[command(about = "vidpress - batch video compression driven by FFmpeg")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Config file (default: ./vidpress.toml, then the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress video files
    Compress(args::CompressArgs),
    /// List supported codecs and encoders
    Codecs(args::CodecsArgs),
    /// Print the effective configuration
    Config(args::ConfigArgs),
}
