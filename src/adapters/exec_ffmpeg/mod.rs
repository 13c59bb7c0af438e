//! FFmpeg execution adapter
//!
//! Launches the `ffmpeg` binary as a child process, forwards its stdout
//! line by line, keeps the tail of stderr for diagnostics and turns stop
//! requests into signals.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::ports::{EngineExit, EngineInvocation, EnginePort, EngineRun, EngineSignal};

/// Environment variable that overrides engine discovery
pub const FFMPEG_ENV: &str = "VIDPRESS_FFMPEG";

/// Lines of stderr kept for failure classification
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// How long to wait for the output pipes to drain after the process exits
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// FFmpeg-based execution adapter
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    program: PathBuf,
}

impl FfmpegAdapter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find the engine: `VIDPRESS_FFMPEG`, then the configured path, then `PATH`
    pub fn locate(configured: Option<&Path>) -> Result<Self, CompressionError> {
        let explicit = std::env::var_os(FFMPEG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| configured.map(Path::to_path_buf));

        // An explicit choice that does not resolve is an error, not a cue to search PATH
        if let Some(candidate) = explicit {
            return which::which(&candidate)
                .map(|path| {
                    debug!(path = %path.display(), "Using configured FFmpeg");
                    Self::new(path)
                })
                .map_err(|err| {
                    CompressionError::with_detail(
                        ErrorKind::EngineNotFound,
                        format!("{}: {}", candidate.display(), err),
                    )
                });
        }

        which::which("ffmpeg")
            .map(|path| {
                debug!(path = %path.display(), "Found FFmpeg on PATH");
                Self::new(path)
            })
            .map_err(|err| {
                CompressionError::with_detail(ErrorKind::EngineNotFound, format!("ffmpeg: {}", err))
            })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Names of the encoders this FFmpeg build provides
    pub async fn available_encoders(&self) -> Result<BTreeSet<String>, CompressionError> {
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(&err))?;

        if !output.status.success() {
            return Err(CompressionError::with_detail(
                ErrorKind::Unknown,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )
            .with_exit_code(exit_code(output.status)));
        }

        // Encoder lines look like " V....D libx264  libx264 H.264 / AVC ..."
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let flags = fields.next()?;
                let name = fields.next()?;
                (flags.len() == 6 && flags.starts_with(['V', 'A', 'S']) && name != "=")
                    .then(|| name.to_string())
            })
            .collect())
    }

    fn spawn_error(&self, err: &std::io::Error) -> CompressionError {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::EngineNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Unknown,
        };
        CompressionError::with_detail(kind, format!("{}: {}", self.program.display(), err))
    }
}

#[async_trait]
impl EnginePort for FfmpegAdapter {
    async fn spawn(&self, invocation: &EngineInvocation) -> Result<EngineRun, CompressionError> {
        let mut child = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| self.spawn_error(&err))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_lines(stdout, line_tx)));
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

        tokio::spawn(watch_child(
            child,
            stdin,
            control_rx,
            stdout_task,
            stderr_task,
            exit_tx,
        ));

        Ok(EngineRun {
            pid,
            output: line_rx,
            exit: exit_rx,
            control: control_tx,
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    // Keep draining even if nobody listens, so the engine never blocks on a full pipe
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = tx.send(line);
    }
}

async fn collect_tail<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: "vidpress::ffmpeg", "{}", line);
        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Reap the child, acting on stop requests until it exits
async fn watch_child(
    mut child: Child,
    mut stdin: Option<ChildStdin>,
    mut control: mpsc::UnboundedReceiver<EngineSignal>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<String>>,
    exit_tx: oneshot::Sender<EngineExit>,
) {
    let mut control_open = true;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = control.recv(), if control_open => match signal {
                Some(EngineSignal::Terminate) => request_stop(&child, &mut stdin).await,
                Some(EngineSignal::Kill) => {
                    if let Err(err) = child.start_kill() {
                        debug!(error = %err, "Kill failed, engine probably already exited");
                    }
                }
                None => control_open = false,
            },
        }
    };
    drop(stdin);

    if let Some(task) = stdout_task {
        if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, task).await.is_err() {
            warn!("Engine stdout still open after exit, dropping remaining progress");
        }
    }
    let diagnostics = match stderr_task {
        Some(task) => match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, task).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        },
        None => String::new(),
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(err) => {
            warn!(error = %err, "Failed to wait for engine process");
            -1
        }
    };
    debug!(exit_code = code, "Engine process exited");
    let _ = exit_tx.send(EngineExit { code, diagnostics });
}

#[cfg(unix)]
async fn request_stop(child: &Child, _stdin: &mut Option<ChildStdin>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid, error = %err, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
async fn request_stop(_child: &Child, stdin: &mut Option<ChildStdin>) {
    use tokio::io::AsyncWriteExt;

    // FFmpeg finishes the file and exits on 'q'
    if let Some(input) = stdin.as_mut() {
        if let Err(err) = input.write_all(b"q").await {
            debug!(error = %err, "Could not send quit to engine");
        }
        let _ = input.flush().await;
    }
}

/// Exit code, or `-signal` for a process killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
