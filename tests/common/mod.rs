//! Scripted ports shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use vidpress_cli::domain::errors::{CompressionError, ErrorKind};
use vidpress_cli::domain::model::{SourceLocation, VideoFile};
use vidpress_cli::engine::{ProcessSupervisor, SupervisorConfig};
use vidpress_cli::ports::{EngineExit, EngineInvocation, EnginePort, EngineRun, EngineSignal, FsPort};

/// What a fake engine does once it has written its lines
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopBehavior {
    /// Exit right away; a Terminate while writing lines exits with -15
    RunToEnd,
    /// Keep running until signalled. Terminate exits with the given code
    /// (`None` ignores it), Kill exits with -9.
    WaitForSignal { on_terminate: Option<i32> },
}

/// One scripted engine run
#[derive(Debug, Clone)]
pub struct Script {
    pub lines: Vec<String>,
    pub line_delay: Duration,
    pub exit_code: i32,
    pub diagnostics: String,
    pub stop: StopBehavior,
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            lines: Vec::new(),
            line_delay: Duration::ZERO,
            exit_code: code,
            diagnostics: String::new(),
            stop: StopBehavior::RunToEnd,
        }
    }

    pub fn success() -> Self {
        Self::exit(0)
    }

    /// Runs until a stop signal arrives
    pub fn hanging(on_terminate: Option<i32>) -> Self {
        Self {
            stop: StopBehavior::WaitForSignal { on_terminate },
            ..Self::exit(0)
        }
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &str) -> Self {
        self.diagnostics = diagnostics.to_string();
        self
    }
}

/// Progress output for a run of `total_secs`, in `steps` equal steps
pub fn progress_lines(total_secs: u64, steps: u64) -> Vec<String> {
    let mut lines = Vec::new();
    for step in 1..=steps {
        let micros = total_secs * 1_000_000 * step / steps;
        lines.push(format!("out_time_us={}", micros));
        lines.push("progress=continue".to_string());
    }
    lines.push("progress=end".to_string());
    lines
}

/// Engine port that plays scripts instead of launching a process.
///
/// Spawns take scripts in order; the last one repeats.
pub struct FakeEngine {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Script>,
    invocations: Mutex<Vec<EngineInvocation>>,
    signals: Arc<Mutex<Vec<EngineSignal>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Self::sequence(vec![script])
    }

    pub fn sequence(scripts: Vec<Script>) -> Arc<Self> {
        let last = scripts.last().cloned().unwrap_or_else(Script::success);
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(last),
            invocations: Mutex::new(Vec::new()),
            signals: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn invocations(&self) -> Vec<EngineInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn signals(&self) -> Vec<EngineSignal> {
        self.signals.lock().unwrap().clone()
    }

    /// Most runs alive at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.pop_front() {
            Some(script) => {
                *self.last.lock().unwrap() = script.clone();
                script
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl EnginePort for FakeEngine {
    async fn spawn(&self, invocation: &EngineInvocation) -> Result<EngineRun, CompressionError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let script = self.next_script();

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::spawn(play(
            script,
            output_tx,
            exit_tx,
            control_rx,
            Arc::clone(&self.signals),
            Arc::clone(&self.running),
        ));

        Ok(EngineRun {
            pid: Some(4242),
            output: output_rx,
            exit: exit_rx,
            control: control_tx,
        })
    }
}

async fn play(
    script: Script,
    output: mpsc::UnboundedSender<String>,
    exit: oneshot::Sender<EngineExit>,
    mut control: mpsc::UnboundedReceiver<EngineSignal>,
    signals: Arc<Mutex<Vec<EngineSignal>>>,
    running: Arc<AtomicUsize>,
) {
    let on_terminate = match script.stop {
        StopBehavior::RunToEnd => Some(-15),
        StopBehavior::WaitForSignal { on_terminate } => on_terminate,
    };
    let react = |signal: EngineSignal| {
        signals.lock().unwrap().push(signal);
        match signal {
            EngineSignal::Kill => Some(-9),
            EngineSignal::Terminate => on_terminate,
        }
    };

    let mut stopped = None;
    for line in &script.lines {
        if !script.line_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(script.line_delay) => {}
                Some(signal) = control.recv() => {
                    stopped = react(signal);
                }
            }
        }
        if stopped.is_some() {
            break;
        }
        let _ = output.send(line.clone());
    }

    let code = match (stopped, script.stop) {
        (Some(code), _) => code,
        (None, StopBehavior::RunToEnd) => script.exit_code,
        (None, StopBehavior::WaitForSignal { .. }) => loop {
            match control.recv().await {
                Some(signal) => {
                    if let Some(code) = react(signal) {
                        break code;
                    }
                }
                None => break script.exit_code,
            }
        },
    };

    drop(output);
    running.fetch_sub(1, Ordering::SeqCst);
    let _ = exit.send(EngineExit {
        code,
        diagnostics: script.diagnostics,
    });
}

/// File system port with fixed answers
#[derive(Debug, Clone)]
pub struct FakeFs {
    pub source_exists: bool,
    pub readable: bool,
    /// `None` makes the free-space query fail
    pub free_space: Option<u64>,
    /// Size reported for every file; `None` means not found
    pub output_size: Option<u64>,
    pub mkdir_fails: bool,
}

impl Default for FakeFs {
    fn default() -> Self {
        Self {
            source_exists: true,
            readable: true,
            free_space: Some(u64::MAX),
            output_size: Some(400),
            mkdir_fails: false,
        }
    }
}

#[async_trait]
impl FsPort for FakeFs {
    async fn file_exists(&self, _path: &Path) -> Result<bool, CompressionError> {
        Ok(self.source_exists)
    }

    async fn check_readable(&self, path: &Path) -> Result<(), CompressionError> {
        if self.readable {
            Ok(())
        } else {
            Err(CompressionError::with_detail(
                ErrorKind::PermissionDenied,
                path.display().to_string(),
            ))
        }
    }

    async fn get_file_size(&self, path: &Path) -> Result<u64, CompressionError> {
        self.output_size.ok_or_else(|| {
            CompressionError::with_detail(ErrorKind::FileNotFound, path.display().to_string())
        })
    }

    async fn create_directory(&self, path: &Path) -> Result<(), CompressionError> {
        if self.mkdir_fails {
            Err(CompressionError::with_detail(
                ErrorKind::PermissionDenied,
                path.display().to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn get_available_space(&self, _path: &Path) -> Result<u64, CompressionError> {
        self.free_space
            .ok_or_else(|| CompressionError::with_detail(ErrorKind::Unknown, "statvfs failed"))
    }
}

pub fn supervisor(engine: Arc<FakeEngine>, fs: FakeFs) -> ProcessSupervisor {
    supervisor_with_grace(engine, fs, Duration::from_millis(200))
}

pub fn supervisor_with_grace(engine: Arc<FakeEngine>, fs: FakeFs, grace_period: Duration) -> ProcessSupervisor {
    ProcessSupervisor::new(engine, Arc::new(fs), SupervisorConfig { grace_period })
}

/// A ten-second, 1000-byte local video
pub fn video(name: &str) -> VideoFile {
    VideoFile::new(SourceLocation::parse(&format!("/videos/{}", name)), name, 10.0, 1_000).unwrap()
}

/// Input path passed to the engine (`-i <input>`)
pub fn input_of(invocation: &EngineInvocation) -> String {
    let args: Vec<String> = invocation
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    args.iter()
        .position(|arg| arg == "-i")
        .and_then(|index| args.get(index + 1))
        .cloned()
        .unwrap_or_default()
}

/// Output path passed to the engine (last argument)
pub fn output_of(invocation: &EngineInvocation) -> String {
    invocation
        .args
        .last()
        .map(|arg| arg.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run `future` with a deadline so a hung run fails the test instead of
/// blocking it
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}
