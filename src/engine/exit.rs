//! Classification of engine exits into run outcomes

use tracing::warn;

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::ports::EngineExit;

/// Exit codes commonly produced when the engine is stopped by a signal:
/// 255 is FFmpeg's own "received signal" exit, negative values are
/// signal-terminated processes (SIGINT, SIGKILL, SIGTERM).
///
/// Platform-dependent: this is a hint for logging only. Whether a run was
/// cancelled is decided by the run's cancellation flag.
pub const SIGNAL_LIKE_EXIT_CODES: [i32; 4] = [255, -2, -9, -15];

/// Engine exit codes with a known meaning. Anything else is `Unknown`.
const EXIT_CODE_TABLE: &[(i32, ErrorKind)] = &[
    (1, ErrorKind::CompressionFailed),
    // Rate / resource limit exceeded
    (69, ErrorKind::CompressionFailed),
    // Hard exit requested from inside the engine
    (123, ErrorKind::CompressionFailed),
    // Shell conventions when the engine is launched through a wrapper script
    (126, ErrorKind::PermissionDenied),
    (127, ErrorKind::EngineNotFound),
];

/// Substrings in the engine's diagnostics that pin a failure down further.
/// Checked in order; the first match wins.
const DIAGNOSTIC_PATTERNS: &[(&str, ErrorKind)] = &[
    ("no space left on device", ErrorKind::InsufficientSpace),
    ("permission denied", ErrorKind::PermissionDenied),
    ("no such file or directory", ErrorKind::FileNotFound),
    ("invalid data found when processing input", ErrorKind::CorruptedFile),
    ("moov atom not found", ErrorKind::CorruptedFile),
    ("unknown encoder", ErrorKind::UnsupportedFormat),
    ("encoder not found", ErrorKind::UnsupportedFormat),
    ("could not find tag for codec", ErrorKind::UnsupportedFormat),
    ("connection refused", ErrorKind::NetworkError),
    ("connection timed out", ErrorKind::NetworkError),
    ("network is unreachable", ErrorKind::NetworkError),
    ("failed to resolve hostname", ErrorKind::NetworkError),
];

/// Result of looking at an engine exit, before any output inspection
#[derive(Debug, Clone, PartialEq)]
pub enum ExitVerdict {
    Success,
    Cancelled,
    Failed(CompressionError),
}

pub struct ExitClassifier;

impl ExitClassifier {
    /// Classify an exit.
    ///
    /// The cancellation flag wins over every exit code: a run the user
    /// cancelled is cancelled, whatever the engine reported on its way out.
    pub fn classify(exit: &EngineExit, cancel_requested: bool) -> ExitVerdict {
        if cancel_requested {
            return ExitVerdict::Cancelled;
        }
        if exit.code == 0 {
            return ExitVerdict::Success;
        }

        if Self::looks_like_termination_signal(exit.code) {
            warn!(
                exit_code = exit.code,
                "engine exited with a termination-signal code without a cancel request"
            );
        }

        let kind = Self::refine(Self::lookup(exit.code), &exit.diagnostics);
        let mut error = CompressionError::new(kind).with_exit_code(exit.code);
        if let Some(line) = Self::last_meaningful_line(&exit.diagnostics) {
            error = CompressionError::with_detail(kind, line).with_exit_code(exit.code);
        }
        ExitVerdict::Failed(error)
    }

    /// Fixed exit-code lookup; unrecognised codes map to `Unknown`
    pub fn lookup(code: i32) -> ErrorKind {
        EXIT_CODE_TABLE
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    pub fn looks_like_termination_signal(code: i32) -> bool {
        SIGNAL_LIKE_EXIT_CODES.contains(&code)
    }

    /// Sharpen a generic failure using the engine's final diagnostics
    fn refine(kind: ErrorKind, diagnostics: &str) -> ErrorKind {
        if !matches!(kind, ErrorKind::CompressionFailed | ErrorKind::Unknown) {
            return kind;
        }
        let lower = diagnostics.to_lowercase();
        DIAGNOSTIC_PATTERNS
            .iter()
            .find(|(pattern, _)| lower.contains(pattern))
            .map(|(_, refined)| *refined)
            .unwrap_or(kind)
    }

    fn last_meaningful_line(diagnostics: &str) -> Option<String> {
        diagnostics
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.chars().take(240).collect())
    }
}
