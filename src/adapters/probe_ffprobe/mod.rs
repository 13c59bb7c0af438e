//! FFprobe adapter for media file probing
//!
//! Shells out to `ffprobe -v error -print_format json -show_format` and reads
//! the container duration and size from the JSON.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::domain::model::SourceLocation;
use crate::ports::{MediaProbe, ProbePort};

/// Environment variable that overrides ffprobe discovery
pub const FFPROBE_ENV: &str = "VIDPRESS_FFPROBE";

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

/// ffprobe reports numbers as strings
#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

impl FfprobeAdapter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `VIDPRESS_FFPROBE`, then the `ffprobe` next to the engine, then `PATH`
    pub fn locate(engine: Option<&Path>) -> Result<Self, CompressionError> {
        if let Some(path) = std::env::var_os(FFPROBE_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(path));
        }

        let sibling = engine
            .and_then(Path::parent)
            .map(|dir| dir.join(format!("ffprobe{}", std::env::consts::EXE_SUFFIX)))
            .filter(|candidate| candidate.is_file());
        if let Some(path) = sibling {
            return Ok(Self::new(path));
        }

        which::which("ffprobe").map(Self::new).map_err(|err| {
            CompressionError::with_detail(ErrorKind::EngineNotFound, format!("ffprobe: {}", err))
        })
    }

    fn parse(stdout: &[u8]) -> Result<MediaProbe, CompressionError> {
        let output: ProbeOutput = serde_json::from_slice(stdout).map_err(|err| {
            CompressionError::with_detail(ErrorKind::CorruptedFile, format!("unreadable probe output: {}", err))
        })?;
        let format = output.format.ok_or_else(|| {
            CompressionError::with_detail(ErrorKind::CorruptedFile, "no container information")
        })?;

        let duration_secs = format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                CompressionError::with_detail(ErrorKind::CorruptedFile, "container has no duration")
            })?;
        let size = format.size.as_deref().and_then(|s| s.trim().parse().ok());

        Ok(MediaProbe { duration_secs, size })
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe(&self, source: &SourceLocation) -> Result<MediaProbe, CompressionError> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(source.to_engine_input())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => CompressionError::with_detail(
                    ErrorKind::EngineNotFound,
                    format!("{}: {}", self.program.display(), err),
                ),
                _ => CompressionError::from_io(&err, &self.program, ErrorKind::Unknown),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let kind = if source.is_remote() {
                ErrorKind::NetworkError
            } else if stderr.to_lowercase().contains("no such file") {
                ErrorKind::FileNotFound
            } else {
                ErrorKind::CorruptedFile
            };
            return Err(CompressionError::with_detail(kind, format!("{}: {}", source, stderr)));
        }

        let probe = Self::parse(&output.stdout)?;
        debug!(source = %source, duration = probe.duration_secs, size = ?probe.size, "Probed source");
        Ok(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        let json = br#"{"format": {"filename": "a.mp4", "duration": "12.480000", "size": "1048576"}}"#;
        let probe = FfprobeAdapter::parse(json).unwrap();
        assert_eq!(probe.duration_secs, 12.48);
        assert_eq!(probe.size, Some(1_048_576));
    }

    #[test]
    fn test_parse_without_duration() {
        let err = FfprobeAdapter::parse(br#"{"format": {"size": "10"}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedFile);

        let err = FfprobeAdapter::parse(b"not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedFile);
    }
}
