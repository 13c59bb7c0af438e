//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;
use clap_num::number_range;

/// Highest accepted constant-rate-factor style quality value
pub const MAX_QUALITY: u8 = 51;

fn parse_quality(value: &str) -> Result<u8, String> {
    number_range(value, 0, MAX_QUALITY)
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    number_range(value, 0, 64)
}

fn parse_retries(value: &str) -> Result<u32, String> {
    number_range(value, 0, 10)
}

/// Arguments for the compress command
#[derive(Args, Debug, Default)]
pub struct CompressArgs {
    /// Video files, directories or URLs to compress
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// Codec family (h264, hevc)
    #[arg(long)]
    pub codec: Option<String>,

    /// Quality value (CRF scale; lower is better). Defaults per codec
    #[arg(short, long, value_parser = parse_quality)]
    pub quality: Option<u8>,

    /// Use a hardware encoder
    #[arg(long)]
    pub hw: bool,

    /// Hardware backend (videotoolbox, nvenc, qsv, vaapi); implies --hw
    #[arg(long, value_name = "BACKEND")]
    pub hw_backend: Option<String>,

    /// Directory for compressed files (default: beside each source)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Suffix added to output file names
    #[arg(long)]
    pub suffix: Option<String>,

    /// Files compressed in parallel (0 = one per CPU core)
    #[arg(short, long, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Automatic retries for retryable failures
    #[arg(long, value_parser = parse_retries)]
    pub retries: Option<u32>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the codecs command
#[derive(Args, Debug, Default)]
pub struct CodecsArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Skip checking which encoders the local FFmpeg provides
    #[arg(long)]
    pub offline: bool,
}

/// Arguments for the config command
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Output in JSON format instead of TOML
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_quality("23"), Ok(23));
        assert!(parse_quality("52").is_err());
        assert!(parse_quality("abc").is_err());
        assert_eq!(parse_jobs("0"), Ok(0));
        assert!(parse_jobs("65").is_err());
        assert!(parse_retries("11").is_err());
    }
}
