// Domain errors - Closed compression error taxonomy

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Every way a compression run can fail.
///
/// The per-kind data (numeric code, message, hint, retryability) lives in
/// [`KIND_TABLE`]; nothing else in the crate should match on a kind to
/// produce user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    EngineNotFound,
    UnsupportedFormat,
    CompressionFailed,
    FileNotFound,
    InsufficientSpace,
    Cancelled,
    InvalidInput,
    OutputPathError,
    PermissionDenied,
    NetworkError,
    CorruptedFile,
    Unknown,
}

/// Static description of an error kind
#[derive(Debug)]
pub struct KindInfo {
    pub kind: ErrorKind,
    pub code: u16,
    pub slug: &'static str,
    pub message: &'static str,
    pub recovery_hint: Option<&'static str>,
    pub retryable: bool,
}

/// Indexed by `ErrorKind as usize`.
static KIND_TABLE: [KindInfo; 12] = [
    KindInfo {
        kind: ErrorKind::EngineNotFound,
        code: 1001,
        slug: "engine-not-found",
        message: "The FFmpeg engine could not be found",
        recovery_hint: Some("Install FFmpeg or set VIDPRESS_FFMPEG to the ffmpeg binary"),
        retryable: false,
    },
    KindInfo {
        kind: ErrorKind::UnsupportedFormat,
        code: 1002,
        slug: "unsupported-format",
        message: "The video format or requested encoder is not supported",
        recovery_hint: Some("Pick another codec or convert the source first"),
        retryable: false,
    },
    KindInfo {
        kind: ErrorKind::CompressionFailed,
        code: 1003,
        slug: "compression-failed",
        message: "Compression failed",
        recovery_hint: Some("Check the engine output and try again"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::FileNotFound,
        code: 1004,
        slug: "file-not-found",
        message: "The file could not be found",
        recovery_hint: Some("Make sure the file still exists at its original location"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::InsufficientSpace,
        code: 1005,
        slug: "insufficient-space",
        message: "Not enough free disk space for the compressed file",
        recovery_hint: Some("Free up disk space or choose another output directory"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::Cancelled,
        code: 1006,
        slug: "cancelled",
        message: "Compression was cancelled",
        recovery_hint: None,
        retryable: false,
    },
    KindInfo {
        kind: ErrorKind::InvalidInput,
        code: 1007,
        slug: "invalid-input",
        message: "The input is invalid or unreadable",
        recovery_hint: Some("Check the source file and the compression settings"),
        retryable: false,
    },
    KindInfo {
        kind: ErrorKind::OutputPathError,
        code: 1008,
        slug: "output-path-error",
        message: "The output location cannot be written",
        recovery_hint: Some("Choose a writable output directory"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::PermissionDenied,
        code: 1009,
        slug: "permission-denied",
        message: "Permission denied",
        recovery_hint: Some("Check the file and directory permissions"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::NetworkError,
        code: 1010,
        slug: "network-error",
        message: "A network error interrupted the compression",
        recovery_hint: Some("Check the connection to the remote source"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::CorruptedFile,
        code: 1011,
        slug: "corrupted-file",
        message: "The video file appears to be corrupted",
        recovery_hint: Some("Try re-exporting or re-downloading the source"),
        retryable: true,
    },
    KindInfo {
        kind: ErrorKind::Unknown,
        code: 1999,
        slug: "unknown",
        message: "An unknown error occurred",
        recovery_hint: None,
        retryable: true,
    },
];

impl ErrorKind {
    /// All kinds, in table order
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::EngineNotFound,
        ErrorKind::UnsupportedFormat,
        ErrorKind::CompressionFailed,
        ErrorKind::FileNotFound,
        ErrorKind::InsufficientSpace,
        ErrorKind::Cancelled,
        ErrorKind::InvalidInput,
        ErrorKind::OutputPathError,
        ErrorKind::PermissionDenied,
        ErrorKind::NetworkError,
        ErrorKind::CorruptedFile,
        ErrorKind::Unknown,
    ];

    pub fn info(self) -> &'static KindInfo {
        &KIND_TABLE[self as usize]
    }

    pub fn code(self) -> u16 {
        self.info().code
    }

    pub fn message(self) -> &'static str {
        self.info().message
    }

    pub fn recovery_hint(self) -> Option<&'static str> {
        self.info().recovery_hint
    }

    pub fn is_retryable(self) -> bool {
        self.info().retryable
    }

    /// Look up a kind by its stable numeric code
    pub fn from_code(code: u16) -> Option<Self> {
        KIND_TABLE.iter().find(|info| info.code == code).map(|info| info.kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().slug)
    }
}

/// A compression error: a kind from the closed taxonomy plus optional context.
///
/// The context is for logs and detail views only; decisions are made on
/// [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{} (E{}){}", .kind.message(), .kind.code(), detail_suffix(.detail))]
pub struct CompressionError {
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

impl CompressionError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            detail: None,
            exit_code: None,
        }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
            exit_code: None,
        }
    }

    /// Attach the engine exit code that produced this error
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Same context, different kind
    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Map an I/O error on `path` into the taxonomy, using `fallback` for
    /// anything that is neither a missing file nor a permission problem.
    pub fn from_io(err: &std::io::Error, path: &std::path::Path, fallback: ErrorKind) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => fallback,
        };
        Self::with_detail(kind, format!("{}: {}", path.display(), err))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    pub fn recovery_hint(&self) -> Option<&'static str> {
        self.kind.recovery_hint()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl From<ErrorKind> for CompressionError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default()
}
