// Domain models - Core types and data structures

use std::ffi::OsString;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::domain::rules::{InvalidTransition, StatusMachine, Transition};
use crate::utils::Utils;

/// Opaque identity of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoFileId(Uuid);

impl VideoFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VideoFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the engine reads the source from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    const URL_SCHEMES: [&'static str; 6] = ["http://", "https://", "rtmp://", "rtsp://", "ftp://", "srt://"];

    /// Classify a user-supplied location as a URL or a local path
    pub fn parse(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if Self::URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            SourceLocation::Url(location.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(location))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocation::Url(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            SourceLocation::Path(path) => Some(path),
            SourceLocation::Url(_) => None,
        }
    }

    /// Argument handed to the engine's `-i`
    pub fn to_engine_input(&self) -> OsString {
        match self {
            SourceLocation::Path(path) => path.as_os_str().to_os_string(),
            SourceLocation::Url(url) => OsString::from(url),
        }
    }

    /// Name without directories or extension, used to derive output names
    pub fn stem(&self) -> String {
        let stem = match self {
            SourceLocation::Path(path) => path.file_stem().map(|s| s.to_string_lossy().to_string()),
            SourceLocation::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .map(|name| match name.rsplit_once('.') {
                    Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                    _ => name.to_string(),
                }),
        };
        stem.filter(|s| !s.is_empty()).unwrap_or_else(|| "video".to_string())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Per-file compression state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum CompressionStatus {
    Pending,
    Compressing,
    Completed,
    Failed(CompressionError),
    Cancelled,
}

impl CompressionStatus {
    /// Completed, failed and cancelled end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CompressionStatus::Completed | CompressionStatus::Failed(_) | CompressionStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompressionStatus::Pending => "pending",
            CompressionStatus::Compressing => "compressing",
            CompressionStatus::Completed => "completed",
            CompressionStatus::Failed(_) => "failed",
            CompressionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CompressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionStatus::Failed(reason) => write!(f, "failed ({})", reason.kind()),
            other => f.write_str(other.label()),
        }
    }
}

/// One queue item.
///
/// Mutable fields change only through [`VideoFile::apply`], which enforces the
/// status machine and its side effects.
#[derive(Debug, Clone, Serialize)]
pub struct VideoFile {
    id: VideoFileId,
    source: SourceLocation,
    name: String,
    duration_secs: f64,
    original_size: u64,
    compressed_size: Option<u64>,
    progress: f64,
    status: CompressionStatus,
    attempts: u32,
    added_at: DateTime<Utc>,
}

impl VideoFile {
    /// Create a pending item
    pub fn new(
        source: SourceLocation,
        name: impl Into<String>,
        duration_secs: f64,
        original_size: u64,
    ) -> Result<Self, CompressionError> {
        if original_size == 0 {
            return Err(CompressionError::with_detail(
                ErrorKind::InvalidInput,
                format!("{} is empty", source),
            ));
        }
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            return Err(CompressionError::with_detail(
                ErrorKind::InvalidInput,
                format!("invalid duration {} for {}", duration_secs, source),
            ));
        }

        Ok(Self {
            id: VideoFileId::new(),
            source,
            name: name.into(),
            duration_secs,
            original_size,
            compressed_size: None,
            progress: 0.0,
            status: CompressionStatus::Pending,
            attempts: 0,
            added_at: Utc::now(),
        })
    }

    pub fn id(&self) -> VideoFileId {
        self.id
    }

    pub fn source(&self) -> &SourceLocation {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn compressed_size(&self) -> Option<u64> {
        self.compressed_size
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn status(&self) -> &CompressionStatus {
        &self.status
    }

    /// Number of runs started for this item
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Apply a status transition and its side effects
    pub fn apply(&mut self, transition: Transition) -> Result<(), InvalidTransition> {
        let next = StatusMachine::next(&self.status, &transition)?;

        match transition {
            Transition::Start => {
                self.progress = 0.0;
                self.attempts += 1;
            }
            Transition::Progress(value) => {
                if value.is_finite() {
                    self.progress = self.progress.max(value.clamp(0.0, 1.0));
                }
            }
            Transition::Complete { compressed_size } => {
                self.compressed_size = Some(compressed_size);
                self.progress = 1.0;
            }
            Transition::Reset => {
                self.progress = 0.0;
                self.compressed_size = None;
            }
            Transition::Fail(_) | Transition::Cancel => {}
        }

        self.status = next;
        Ok(())
    }

    /// Size reduction in percent; `None` until a compressed size exists
    pub fn compression_ratio(&self) -> Option<f64> {
        let compressed = self.compressed_size?;
        if self.original_size == 0 {
            return None;
        }
        Some((1.0 - compressed as f64 / self.original_size as f64) * 100.0)
    }

    /// Bytes saved; negative when the output grew
    pub fn bytes_saved(&self) -> Option<i64> {
        self.compressed_size
            .map(|compressed| self.original_size as i64 - compressed as i64)
    }

    pub fn is_larger_than_original(&self) -> bool {
        self.compressed_size
            .map(|compressed| compressed > self.original_size)
            .unwrap_or(false)
    }

    /// Durations past what `Duration` holds saturate
    pub fn formatted_duration(&self) -> String {
        let duration = std::time::Duration::try_from_secs_f64(self.duration_secs)
            .unwrap_or(std::time::Duration::MAX);
        Utils::format_duration(duration)
    }

    pub fn formatted_original_size(&self) -> String {
        Utils::format_file_size(self.original_size)
    }

    pub fn formatted_compressed_size(&self) -> Option<String> {
        self.compressed_size.map(Utils::format_file_size)
    }
}

/// Supported codec families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Hevc,
}

impl Codec {
    pub const ALL: [Codec; 2] = [Codec::H264, Codec::Hevc];

    pub fn parse(value: &str) -> Result<Self, CompressionError> {
        match value.to_lowercase().as_str() {
            "h264" | "avc" | "x264" => Ok(Codec::H264),
            "hevc" | "h265" | "x265" => Ok(Codec::Hevc),
            other => Err(CompressionError::with_detail(
                ErrorKind::UnsupportedFormat,
                format!("unknown codec '{}'. Supported codecs: h264, hevc", other),
            )),
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Hevc => "hevc",
        }
    }

    pub fn software_encoder(self) -> &'static str {
        match self {
            Codec::H264 => "libx264",
            Codec::Hevc => "libx265",
        }
    }

    /// Encoder name for a hardware backend
    pub fn hardware_encoder(self, backend: HardwareBackend) -> &'static str {
        match (self, backend) {
            (Codec::H264, HardwareBackend::VideoToolbox) => "h264_videotoolbox",
            (Codec::H264, HardwareBackend::Nvenc) => "h264_nvenc",
            (Codec::H264, HardwareBackend::Qsv) => "h264_qsv",
            (Codec::H264, HardwareBackend::Vaapi) => "h264_vaapi",
            (Codec::Hevc, HardwareBackend::VideoToolbox) => "hevc_videotoolbox",
            (Codec::Hevc, HardwareBackend::Nvenc) => "hevc_nvenc",
            (Codec::Hevc, HardwareBackend::Qsv) => "hevc_qsv",
            (Codec::Hevc, HardwareBackend::Vaapi) => "hevc_vaapi",
        }
    }

    /// Constant-rate-factor values that give sensible size/quality trade-offs
    pub fn recommended_quality_range(self) -> RangeInclusive<u8> {
        match self {
            Codec::H264 => 18..=28,
            Codec::Hevc => 20..=32,
        }
    }

    pub fn default_quality(self) -> u8 {
        match self {
            Codec::H264 => 23,
            Codec::Hevc => 28,
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::H264
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Hardware encoder families the engine can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    VideoToolbox,
    Nvenc,
    Qsv,
    Vaapi,
}

impl HardwareBackend {
    pub fn parse(value: &str) -> Result<Self, CompressionError> {
        match value.to_lowercase().as_str() {
            "videotoolbox" => Ok(HardwareBackend::VideoToolbox),
            "nvenc" => Ok(HardwareBackend::Nvenc),
            "qsv" => Ok(HardwareBackend::Qsv),
            "vaapi" => Ok(HardwareBackend::Vaapi),
            other => Err(CompressionError::with_detail(
                ErrorKind::UnsupportedFormat,
                format!(
                    "unknown hardware backend '{}'. Supported: videotoolbox, nvenc, qsv, vaapi",
                    other
                ),
            )),
        }
    }

    /// Backend assumed present when acceleration is requested without naming one
    pub fn platform_default() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(HardwareBackend::VideoToolbox)
        } else {
            None
        }
    }
}

/// Knobs for one compression run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: Codec,
    /// Codec default when unset
    pub quality: Option<u8>,
    pub hardware_acceleration: bool,
    pub hardware_backend: Option<HardwareBackend>,
    /// Beside the source when unset
    pub output_dir: Option<PathBuf>,
    #[serde(alias = "suffix")]
    pub output_suffix: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            quality: None,
            hardware_acceleration: false,
            hardware_backend: None,
            output_dir: None,
            output_suffix: "_compressed".to_string(),
        }
    }
}

impl CompressionConfig {
    pub fn effective_quality(&self) -> u8 {
        self.quality.unwrap_or_else(|| self.codec.default_quality())
    }

    /// Hardware backend in effect, if acceleration is on and one is available
    pub fn effective_backend(&self) -> Option<HardwareBackend> {
        if !self.hardware_acceleration {
            return None;
        }
        self.hardware_backend.or_else(HardwareBackend::platform_default)
    }

    /// Encoder name passed to `-c:v`
    pub fn encoder(&self) -> &'static str {
        match self.effective_backend() {
            Some(backend) => self.codec.hardware_encoder(backend),
            None => self.codec.software_encoder(),
        }
    }

    pub fn validate(&self) -> Result<(), CompressionError> {
        let quality = self.effective_quality();
        let range = self.codec.recommended_quality_range();
        if !range.contains(&quality) {
            return Err(CompressionError::with_detail(
                ErrorKind::InvalidInput,
                format!(
                    "quality {} is outside the {} range {}-{}",
                    quality,
                    self.codec,
                    range.start(),
                    range.end()
                ),
            ));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(CompressionError::with_detail(
                ErrorKind::InvalidInput,
                format!("output suffix '{}' must not contain path separators", self.output_suffix),
            ));
        }
        Ok(())
    }
}

/// Resolved result of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Completed { compressed_size: u64 },
    Failed { error: CompressionError },
    Cancelled,
}

impl Outcome {
    /// The transition that records this outcome on a compressing item
    pub fn to_transition(&self) -> Transition {
        match self {
            Outcome::Completed { compressed_size } => Transition::Complete {
                compressed_size: *compressed_size,
            },
            Outcome::Failed { error } => Transition::Fail(error.clone()),
            Outcome::Cancelled => Transition::Cancel,
        }
    }
}
