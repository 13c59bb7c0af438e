// Ports - Interface definitions (contracts)

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::domain::errors::CompressionError;
use crate::domain::model::SourceLocation;

/// Arguments for one engine run; the adapter supplies the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub args: Vec<OsString>,
}

impl EngineInvocation {
    /// Render for logs
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                let arg = arg.to_string_lossy();
                if arg.contains(' ') {
                    format!("\"{}\"", arg)
                } else {
                    arg.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stop requests sent to a running engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    /// Ask the engine to finish up and exit
    Terminate,
    /// Kill it outright
    Kill,
}

/// How the engine process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineExit {
    /// Process exit code; a process killed by signal `N` reports `-N`
    pub code: i32,
    /// Tail of the engine's diagnostic output
    pub diagnostics: String,
}

/// A launched engine process, owned by the supervisor's monitor.
///
/// `output` yields the engine's progress lines and closes once the process has
/// stopped writing; `exit` resolves after the process is reaped and all output
/// has been forwarded.
#[derive(Debug)]
pub struct EngineRun {
    pub pid: Option<u32>,
    pub output: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<EngineExit>,
    pub control: mpsc::UnboundedSender<EngineSignal>,
}

/// Port for launching the external transcoding engine
#[async_trait]
pub trait EnginePort: Send + Sync {
    /// Spawn the engine with the given arguments
    async fn spawn(&self, invocation: &EngineInvocation) -> Result<EngineRun, CompressionError>;
}

/// Port for file system operations
#[async_trait]
pub trait FsPort: Send + Sync {
    /// Check if file exists
    async fn file_exists(&self, path: &Path) -> Result<bool, CompressionError>;

    /// Open the file for reading to prove it is readable
    async fn check_readable(&self, path: &Path) -> Result<(), CompressionError>;

    /// Get file size
    async fn get_file_size(&self, path: &Path) -> Result<u64, CompressionError>;

    /// Create directory (including parent directories)
    async fn create_directory(&self, path: &Path) -> Result<(), CompressionError>;

    /// Get available disk space for directory
    async fn get_available_space(&self, path: &Path) -> Result<u64, CompressionError>;
}

/// Container-level facts about a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProbe {
    pub duration_secs: f64,
    /// Byte size as reported by the container, if known
    pub size: Option<u64>,
}

/// Port for media probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    async fn probe(&self, source: &SourceLocation) -> Result<MediaProbe, CompressionError>;
}
