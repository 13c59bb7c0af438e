//! Configuration initialization and hierarchy management
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `VIDPRESS_*` environment variables, command-line flags.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::adapters::toml_config::{TomlConfigAdapter, VidpressConfig};
use crate::cli::args::CompressArgs;
use crate::cli::Cli;
use crate::domain::model::{Codec, HardwareBackend};
use crate::error::{VidpressError, VidpressResult};

/// Environment variables read on top of the config file
pub const ENV_VARIABLES: &[&str] = &[
    "VIDPRESS_CODEC",
    "VIDPRESS_QUALITY",
    "VIDPRESS_HW",
    "VIDPRESS_HW_BACKEND",
    "VIDPRESS_OUTPUT_DIR",
    "VIDPRESS_SUFFIX",
    "VIDPRESS_MAX_CONCURRENT",
    "VIDPRESS_MAX_RETRIES",
    "VIDPRESS_GRACE_PERIOD_SECS",
    "VIDPRESS_LOG_LEVEL",
    "VIDPRESS_LOG_JSON",
];

/// Where the effective configuration came from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    pub env_overrides: Vec<&'static str>,
    pub cli_overrides: Vec<&'static str>,
}

impl ConfigSources {
    /// Log the sources once the subscriber is installed
    pub fn log(&self) {
        match &self.file {
            Some(path) => info!(path = %path.display(), "Configuration file loaded"),
            None => info!("No configuration file, using defaults"),
        }
        for name in &self.env_overrides {
            info!("Found environment override: {}", name);
        }
        if !self.cli_overrides.is_empty() {
            info!("Applied {} command-line overrides", self.cli_overrides.len());
        }
    }
}

/// Build the effective configuration for `cli`
pub fn initialize_configuration_hierarchy(
    cli: &Cli,
) -> VidpressResult<(VidpressConfig, ConfigSources)> {
    let (mut config, file) = TomlConfigAdapter::load_or_default(cli.config.as_deref())?;
    let mut sources = ConfigSources {
        file,
        ..ConfigSources::default()
    };

    sources.env_overrides = apply_environment(&mut config, |name| std::env::var(name).ok())?;
    sources.cli_overrides = apply_cli_overrides(&mut config, cli)?;

    config.validate()?;
    Ok((config, sources))
}

/// Apply `VIDPRESS_*` variables found through `lookup`; returns the names
/// that were set. Empty values are ignored.
pub fn apply_environment<F>(config: &mut VidpressConfig, lookup: F) -> VidpressResult<Vec<&'static str>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();
    for &name in ENV_VARIABLES {
        let value = match lookup(name) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => continue,
        };

        match name {
            "VIDPRESS_CODEC" => config.compression.codec = Codec::parse(&value).map_err(|e| env_error(name, e))?,
            "VIDPRESS_QUALITY" => config.compression.quality = Some(parse_number(name, &value)?),
            "VIDPRESS_HW" => config.compression.hardware_acceleration = parse_flag(name, &value)?,
            "VIDPRESS_HW_BACKEND" => {
                config.compression.hardware_backend =
                    Some(HardwareBackend::parse(&value).map_err(|e| env_error(name, e))?);
            }
            "VIDPRESS_OUTPUT_DIR" => config.compression.output_dir = Some(PathBuf::from(&value)),
            "VIDPRESS_SUFFIX" => config.compression.output_suffix = value,
            "VIDPRESS_MAX_CONCURRENT" => config.scheduler.max_concurrent = parse_number(name, &value)?,
            "VIDPRESS_MAX_RETRIES" => config.scheduler.max_retries = parse_number(name, &value)?,
            "VIDPRESS_GRACE_PERIOD_SECS" => config.engine.grace_period_secs = parse_number(name, &value)?,
            "VIDPRESS_LOG_LEVEL" => config.logging.level = value.to_lowercase(),
            "VIDPRESS_LOG_JSON" => config.logging.json = parse_flag(name, &value)?,
            _ => continue,
        }
        applied.push(name);
    }
    Ok(applied)
}

/// Apply global flags and, for `compress`, its per-run flags
pub fn apply_cli_overrides(config: &mut VidpressConfig, cli: &Cli) -> VidpressResult<Vec<&'static str>> {
    let mut applied = Vec::new();

    if let Some(level) = &cli.log_level {
        config.logging.level = level.to_lowercase();
        applied.push("--log-level");
    }
    if cli.log_json {
        config.logging.json = true;
        applied.push("--log-json");
    }
    if let crate::cli::Commands::Compress(args) = &cli.command {
        applied.extend(apply_compress_args(config, args)?);
    }
    Ok(applied)
}

fn apply_compress_args(config: &mut VidpressConfig, args: &CompressArgs) -> VidpressResult<Vec<&'static str>> {
    let mut applied = Vec::new();
    let compression = &mut config.compression;

    if let Some(codec) = &args.codec {
        compression.codec = Codec::parse(codec)?;
        applied.push("--codec");
    }
    if let Some(quality) = args.quality {
        compression.quality = Some(quality);
        applied.push("--quality");
    }
    if args.hw {
        compression.hardware_acceleration = true;
        applied.push("--hw");
    }
    if let Some(backend) = &args.hw_backend {
        compression.hardware_acceleration = true;
        compression.hardware_backend = Some(HardwareBackend::parse(backend)?);
        applied.push("--hw-backend");
    }
    if let Some(dir) = &args.output_dir {
        compression.output_dir = Some(dir.clone());
        applied.push("--output-dir");
    }
    if let Some(suffix) = &args.suffix {
        compression.output_suffix = suffix.clone();
        applied.push("--suffix");
    }
    if let Some(jobs) = args.jobs {
        config.scheduler.max_concurrent = if jobs == 0 { num_cpus::get() } else { jobs };
        applied.push("--jobs");
    }
    if let Some(retries) = args.retries {
        config.scheduler.max_retries = retries;
        applied.push("--retries");
    }
    Ok(applied)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> VidpressResult<T> {
    value
        .parse()
        .map_err(|_| VidpressError::invalid_config(format!("{}: '{}' is not a valid number", name, value)))
}

fn parse_flag(name: &str, value: &str) -> VidpressResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VidpressError::invalid_config(format!(
            "{}: expected true or false, got '{}'",
            name, value
        ))),
    }
}

fn env_error(name: &str, err: crate::domain::errors::CompressionError) -> VidpressError {
    VidpressError::invalid_config(format!("{}: {}", name, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use clap::Parser;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = VidpressConfig::default();
        let applied = apply_environment(
            &mut config,
            env(&[
                ("VIDPRESS_CODEC", "hevc"),
                ("VIDPRESS_QUALITY", "30"),
                ("VIDPRESS_HW_BACKEND", "qsv"),
                ("VIDPRESS_MAX_CONCURRENT", "3"),
                ("VIDPRESS_LOG_JSON", "yes"),
                ("VIDPRESS_SUFFIX", " "),
            ]),
        )
        .unwrap();

        assert_eq!(applied.len(), 5);
        assert_eq!(config.compression.codec, Codec::Hevc);
        assert_eq!(config.compression.quality, Some(30));
        assert_eq!(config.compression.hardware_backend, Some(HardwareBackend::Qsv));
        assert_eq!(config.compression.output_suffix, "_compressed");
        assert_eq!(config.scheduler.max_concurrent, 3);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut config = VidpressConfig::default();
        let err = apply_environment(&mut config, env(&[("VIDPRESS_MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, VidpressError::InvalidConfig { .. }));
        assert!(err.to_string().contains("VIDPRESS_MAX_RETRIES"));

        let err = apply_environment(&mut config, env(&[("VIDPRESS_HW", "maybe")])).unwrap_err();
        assert!(matches!(err, VidpressError::InvalidConfig { .. }));

        let err = apply_environment(&mut config, env(&[("VIDPRESS_CODEC", "vp9")])).unwrap_err();
        assert!(err.to_string().contains("VIDPRESS_CODEC"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = VidpressConfig::default();
        apply_environment(&mut config, env(&[("VIDPRESS_QUALITY", "20"), ("VIDPRESS_LOG_LEVEL", "warn")])).unwrap();

        let cli = Cli::try_parse_from([
            "vidpress", "--log-level", "debug", "compress", "a.mp4", "-q", "25", "--hw-backend", "nvenc",
            "--retries", "2",
        ])
        .unwrap();
        let applied = apply_cli_overrides(&mut config, &cli).unwrap();

        assert!(applied.contains(&"--quality"));
        assert_eq!(config.compression.quality, Some(25));
        assert_eq!(config.logging.level, "debug");
        assert!(config.compression.hardware_acceleration);
        assert_eq!(config.compression.hardware_backend, Some(HardwareBackend::Nvenc));
        assert_eq!(config.scheduler.max_retries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_jobs_means_cpu_count() {
        let mut config = VidpressConfig::default();
        let cli = Cli::try_parse_from(["vidpress", "compress", "a.mp4", "--jobs", "0"]).unwrap();
        apply_cli_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.scheduler.max_concurrent, num_cpus::get());
    }

    #[test]
    fn test_out_of_range_quality_fails_validation() {
        let mut config = VidpressConfig::default();
        apply_environment(&mut config, env(&[("VIDPRESS_QUALITY", "40")])).unwrap();
        assert!(config.validate().is_err());
    }
}
