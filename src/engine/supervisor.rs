//! Supervision of a single engine run
//!
//! A [`JobHandle`] owns everything about one launched engine process: its
//! progress stream, its cancellation flag and its single, memoized outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, OnceCell};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::domain::model::{CompressionConfig, Outcome, VideoFile, VideoFileId};
use crate::engine::exit::{ExitClassifier, ExitVerdict};
use crate::engine::invocation::InvocationBuilder;
use crate::engine::progress::ProgressParser;
use crate::ports::{EngineExit, EnginePort, EngineRun, EngineSignal, FsPort};
use crate::utils::path::PathUtils;
use crate::utils::Utils;

/// Time a gracefully stopped engine gets before it is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Launches engine runs after pre-flight checks
pub struct ProcessSupervisor {
    engine: Arc<dyn EnginePort>,
    fs: Arc<dyn FsPort>,
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(engine: Arc<dyn EnginePort>, fs: Arc<dyn FsPort>, config: SupervisorConfig) -> Self {
        Self { engine, fs, config }
    }

    /// Validate, pre-flight and launch a run for `file`.
    ///
    /// Every failure before the engine is running is returned here; once a
    /// handle exists, failures arrive through [`JobHandle::await_termination`].
    pub async fn start(
        &self,
        file: &VideoFile,
        config: &CompressionConfig,
    ) -> Result<JobHandle, CompressionError> {
        self.start_with_output(file, config, PathUtils::output_path(file.source(), config))
            .await
    }

    /// [`start`](Self::start), writing to `output_path` instead of the
    /// default name
    pub async fn start_with_output(
        &self,
        file: &VideoFile,
        config: &CompressionConfig,
        output_path: PathBuf,
    ) -> Result<JobHandle, CompressionError> {
        config.validate()?;
        self.preflight(file, &output_path).await?;

        let invocation = InvocationBuilder::build(file, config, &output_path);
        debug!(file_id = %file.id(), args = %invocation.display_args(), "Launching engine");

        let run = self.engine.spawn(&invocation).await?;
        info!(
            file_id = %file.id(),
            name = %file.name(),
            pid = ?run.pid,
            encoder = config.encoder(),
            output = %output_path.display(),
            "Compression started"
        );

        Ok(JobHandle::supervise(
            file,
            output_path,
            run,
            self.fs.clone(),
            self.config.grace_period,
        ))
    }

    pub fn progress(&self, handle: &JobHandle) -> WatchStream<f64> {
        handle.progress()
    }

    pub fn cancel(&self, handle: &JobHandle) -> bool {
        handle.cancel()
    }

    pub async fn await_termination(&self, handle: &JobHandle) -> Outcome {
        handle.await_termination().await
    }

    async fn preflight(&self, file: &VideoFile, output_path: &Path) -> Result<(), CompressionError> {
        if let Some(source) = file.source().local_path() {
            if !self.fs.file_exists(source).await? {
                return Err(CompressionError::with_detail(
                    ErrorKind::FileNotFound,
                    source.display().to_string(),
                ));
            }
            self.fs.check_readable(source).await.map_err(|err| match err.kind() {
                ErrorKind::FileNotFound => err,
                _ => err.into_kind(ErrorKind::InvalidInput),
            })?;
            if source == output_path {
                return Err(CompressionError::with_detail(
                    ErrorKind::OutputPathError,
                    format!("output would overwrite the source {}", source.display()),
                ));
            }
        }

        let output_dir = output_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.fs
            .create_directory(output_dir)
            .await
            .map_err(|err| err.into_kind(ErrorKind::OutputPathError))?;

        match self.fs.get_available_space(output_dir).await {
            Ok(available) if available < file.original_size() => {
                Err(CompressionError::with_detail(
                    ErrorKind::InsufficientSpace,
                    format!(
                        "{} free in {}, source is {}",
                        Utils::format_file_size(available),
                        output_dir.display(),
                        file.formatted_original_size()
                    ),
                ))
            }
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(dir = %output_dir.display(), error = %err, "Could not query free space, skipping check");
                Ok(())
            }
        }
    }
}

/// Handle to one running (or finished) engine run.
///
/// Cheap to clone; all clones observe the same run.
#[derive(Clone)]
pub struct JobHandle {
    run: Arc<RunState>,
}

struct RunState {
    file_id: VideoFileId,
    output_path: PathBuf,
    pid: Option<u32>,
    grace_period: Duration,
    fs: Arc<dyn FsPort>,
    control: mpsc::UnboundedSender<EngineSignal>,
    progress: watch::Receiver<f64>,
    exit: watch::Receiver<Option<EngineExit>>,
    cancel_requested: AtomicBool,
    /// Set once classification has read the cancel flag; guards the flag
    sealed: Mutex<bool>,
    outcome: OnceCell<Outcome>,
}

impl JobHandle {
    fn supervise(
        file: &VideoFile,
        output_path: PathBuf,
        run: EngineRun,
        fs: Arc<dyn FsPort>,
        grace_period: Duration,
    ) -> Self {
        let EngineRun {
            pid,
            output,
            exit,
            control,
        } = run;

        let (progress_tx, progress_rx) = watch::channel(0.0_f64);
        let (exit_tx, exit_rx) = watch::channel(None);
        let parser = ProgressParser::new(file.duration_secs());
        tokio::spawn(monitor(output, exit, parser, progress_tx, exit_tx));

        Self {
            run: Arc::new(RunState {
                file_id: file.id(),
                output_path,
                pid,
                grace_period,
                fs,
                control,
                progress: progress_rx,
                exit: exit_rx,
                cancel_requested: AtomicBool::new(false),
                sealed: Mutex::new(false),
                outcome: OnceCell::new(),
            }),
        }
    }

    pub fn file_id(&self) -> VideoFileId {
        self.run.file_id
    }

    pub fn output_path(&self) -> &Path {
        &self.run.output_path
    }

    pub fn pid(&self) -> Option<u32> {
        self.run.pid
    }

    /// Progress fractions for this run, starting with the current value.
    ///
    /// Values never decrease, and the stream ends when the engine process
    /// exits, before the outcome becomes available.
    pub fn progress(&self) -> WatchStream<f64> {
        WatchStream::new(self.run.progress.clone())
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.run.cancel_requested.load(Ordering::SeqCst)
    }

    /// Whether the engine process has exited
    pub fn has_exited(&self) -> bool {
        self.run.exit.borrow().is_some()
    }

    /// Outcome, if already classified
    pub fn outcome(&self) -> Option<Outcome> {
        self.run.outcome.get().cloned()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if this call recorded the request. Once an outcome has
    /// been classified, or a cancel was already requested, this is a no-op.
    /// Outside a tokio runtime there is no grace period: the engine is
    /// killed right after the stop request.
    pub fn cancel(&self) -> bool {
        {
            let sealed = self.run.sealed.lock().unwrap_or_else(PoisonError::into_inner);
            if *sealed || self.run.cancel_requested.swap(true, Ordering::SeqCst) {
                return false;
            }
        }

        if self.has_exited() {
            debug!(file_id = %self.run.file_id, "Cancel recorded after engine exit");
            return true;
        }

        info!(file_id = %self.run.file_id, pid = ?self.run.pid, "Stopping engine");
        if self.run.control.send(EngineSignal::Terminate).is_err() {
            debug!(file_id = %self.run.file_id, "Engine control channel already closed");
            return true;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(file_id = %self.run.file_id, "No runtime for the grace timer, killing engine now");
            let _ = self.run.control.send(EngineSignal::Kill);
            return true;
        };

        let control = self.run.control.clone();
        let mut exit = self.run.exit.clone();
        let grace_period = self.run.grace_period;
        let file_id = self.run.file_id;
        runtime.spawn(async move {
            if tokio::time::timeout(grace_period, wait_for_exit(&mut exit))
                .await
                .is_err()
            {
                warn!(
                    file_id = %file_id,
                    grace_ms = grace_period.as_millis() as u64,
                    "Engine ignored the stop request, killing it"
                );
                let _ = control.send(EngineSignal::Kill);
            }
        });
        true
    }

    /// Wait for the run to end and return its outcome.
    ///
    /// The outcome is classified exactly once; every caller gets the same one.
    pub async fn await_termination(&self) -> Outcome {
        self.run
            .outcome
            .get_or_init(|| self.resolve())
            .await
            .clone()
    }

    async fn resolve(&self) -> Outcome {
        let mut exit_rx = self.run.exit.clone();
        let exit = wait_for_exit(&mut exit_rx).await.unwrap_or_else(|| EngineExit {
            code: -1,
            diagnostics: "engine monitor stopped before reporting an exit".to_string(),
        });

        let cancel_requested = {
            let mut sealed = self.run.sealed.lock().unwrap_or_else(PoisonError::into_inner);
            *sealed = true;
            self.run.cancel_requested.load(Ordering::SeqCst)
        };

        let outcome = match ExitClassifier::classify(&exit, cancel_requested) {
            ExitVerdict::Cancelled => Outcome::Cancelled,
            ExitVerdict::Failed(error) => Outcome::Failed { error },
            ExitVerdict::Success => self.inspect_output().await,
        };

        match &outcome {
            Outcome::Completed { compressed_size } => info!(
                file_id = %self.run.file_id,
                size = compressed_size,
                "Compression completed"
            ),
            Outcome::Cancelled => info!(
                file_id = %self.run.file_id,
                exit_code = exit.code,
                "Compression cancelled"
            ),
            Outcome::Failed { error } => warn!(
                file_id = %self.run.file_id,
                exit_code = exit.code,
                kind = %error.kind(),
                error = %error,
                "Compression failed"
            ),
        }
        outcome
    }

    /// A clean exit still needs a non-empty output file
    async fn inspect_output(&self) -> Outcome {
        match self.run.fs.get_file_size(&self.run.output_path).await {
            Ok(0) => Outcome::Failed {
                error: CompressionError::with_detail(
                    ErrorKind::CorruptedFile,
                    format!("{} is empty", self.run.output_path.display()),
                ),
            },
            Ok(compressed_size) => Outcome::Completed { compressed_size },
            Err(error) => Outcome::Failed { error },
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("file_id", &self.run.file_id)
            .field("pid", &self.run.pid)
            .field("output_path", &self.run.output_path)
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

/// Forward engine output into progress, then publish the exit.
///
/// The progress sender is dropped before the exit is published, so progress
/// streams always end before an outcome can be classified.
async fn monitor(
    mut output: mpsc::UnboundedReceiver<String>,
    mut exit: tokio::sync::oneshot::Receiver<EngineExit>,
    mut parser: ProgressParser,
    progress_tx: watch::Sender<f64>,
    exit_tx: watch::Sender<Option<EngineExit>>,
) {
    let mut forward = |line: &str| {
        if let Some(fraction) = parser.feed(line) {
            progress_tx.send_replace(fraction);
        }
    };

    let result = loop {
        tokio::select! {
            biased;
            line = output.recv() => match line {
                Some(line) => forward(&line),
                None => break (&mut exit).await,
            },
            result = &mut exit => {
                while let Ok(line) = output.try_recv() {
                    forward(&line);
                }
                break result;
            }
        }
    };
    drop(forward);
    drop(progress_tx);

    let exit = result.unwrap_or_else(|_| EngineExit {
        code: -1,
        diagnostics: "engine adapter dropped the run without an exit status".to_string(),
    });
    exit_tx.send_replace(Some(exit));
}

/// Wait until an exit is published; `None` if the monitor vanished without one
async fn wait_for_exit(exit: &mut watch::Receiver<Option<EngineExit>>) -> Option<EngineExit> {
    loop {
        let current = exit.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if exit.changed().await.is_err() {
            return exit.borrow().clone();
        }
    }
}
