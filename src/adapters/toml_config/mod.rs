// TOML config adapter - Configuration management using TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::model::CompressionConfig;
use crate::engine::{SupervisorConfig, DEFAULT_GRACE_PERIOD};
use crate::error::{VidpressError, VidpressResult};

/// Log levels accepted in `[logging] level`
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Complete application configuration, one field per TOML section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VidpressConfig {
    pub compression: CompressionConfig,
    pub scheduler: SchedulerSettings,
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Engine processes running at once
    pub max_concurrent: usize,
    /// Automatic retries for retryable failures
    pub max_retries: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Explicit ffmpeg binary; searched on PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Seconds between the graceful stop and the forced kill
    pub grace_period_secs: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            grace_period_secs: DEFAULT_GRACE_PERIOD.as_secs_f64(),
        }
    }
}

impl EngineSettings {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_secs_f64(self.grace_period_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    /// Emit log lines as JSON objects
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl VidpressConfig {
    pub fn validate(&self) -> VidpressResult<()> {
        self.compression
            .validate()
            .map_err(|err| VidpressError::invalid_config(format!("[compression] {}", err)))?;

        if self.scheduler.max_concurrent == 0 {
            return Err(VidpressError::invalid_config(
                "[scheduler] max_concurrent must be at least 1",
            ));
        }

        let grace = self.engine.grace_period_secs;
        if !grace.is_finite() || grace <= 0.0 || grace > 3600.0 {
            return Err(VidpressError::invalid_config(format!(
                "[engine] grace_period_secs must be between 0 and 3600, got {}",
                grace
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(VidpressError::invalid_config(format!(
                "[logging] unknown level '{}'. Expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    pub const FILE_NAME: &'static str = "vidpress.toml";

    /// Per-user config file location
    pub fn default_config_path() -> Option<PathBuf> {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Some(PathBuf::from(appdata).join("vidpress").join("config.toml"));
        }
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg).join("vidpress").join("config.toml"));
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("vidpress").join("config.toml"))
    }

    /// Files searched, in order, when no config is given explicitly
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::FILE_NAME)];
        paths.extend(Self::default_config_path());
        paths
    }

    pub fn parse(content: &str, path: &Path) -> VidpressResult<VidpressConfig> {
        toml::from_str(content).map_err(|source| VidpressError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> VidpressResult<VidpressConfig> {
        let content = std::fs::read_to_string(path).map_err(|source| VidpressError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, path)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load `explicit` (which must exist) or the first candidate file found;
    /// defaults when there is none. Returns the file used, if any.
    pub fn load_or_default(
        explicit: Option<&Path>,
    ) -> VidpressResult<(VidpressConfig, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }
        debug!("No configuration file found, using defaults");
        Ok((VidpressConfig::default(), None))
    }

    /// Render the configuration as TOML
    pub fn to_toml(config: &VidpressConfig) -> VidpressResult<String> {
        toml::to_string_pretty(config).map_err(|err| VidpressError::invalid_config(err.to_string()))
    }
}
