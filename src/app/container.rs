use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{FfmpegAdapter, FfprobeAdapter, LocalFsAdapter, VidpressConfig};
use crate::app::intake::MediaIntake;
use crate::app::scheduler::{Scheduler, SchedulerConfig};
use crate::domain::errors::CompressionError;
use crate::engine::ProcessSupervisor;
use crate::ports::{EnginePort, FsPort, ProbePort};

/// Wires ports, the supervisor and the scheduler together
pub struct AppContainer {
    fs: Arc<dyn FsPort>,
    probe: Option<Arc<dyn ProbePort>>,
    supervisor: Arc<ProcessSupervisor>,
    scheduler: Scheduler,
}

impl AppContainer {
    /// Production wiring: FFmpeg located on this machine, local disk, ffprobe
    /// when available
    pub fn new(config: &VidpressConfig) -> Result<Self, CompressionError> {
        let engine = FfmpegAdapter::locate(config.engine.ffmpeg_path.as_deref())?;
        info!(ffmpeg = %engine.program().display(), "Engine located");

        let probe = match FfprobeAdapter::locate(Some(engine.program())) {
            Ok(probe) => Some(Arc::new(probe) as Arc<dyn ProbePort>),
            Err(err) => {
                warn!(error = %err, "ffprobe not found, durations will be unknown");
                None
            }
        };

        Ok(Self::with_ports(
            Arc::new(engine),
            Arc::new(LocalFsAdapter::new()),
            probe,
            config,
        ))
    }

    /// Wiring with caller-supplied ports
    pub fn with_ports(
        engine: Arc<dyn EnginePort>,
        fs: Arc<dyn FsPort>,
        probe: Option<Arc<dyn ProbePort>>,
        config: &VidpressConfig,
    ) -> Self {
        let supervisor = Arc::new(ProcessSupervisor::new(
            engine,
            Arc::clone(&fs),
            config.engine.supervisor_config(),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&supervisor),
            config.compression.clone(),
            SchedulerConfig {
                max_concurrent: config.scheduler.max_concurrent,
                max_retries: config.scheduler.max_retries,
            },
        );

        Self {
            fs,
            probe,
            supervisor,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        Arc::clone(&self.supervisor)
    }

    pub fn intake(&self) -> MediaIntake {
        MediaIntake::new(Arc::clone(&self.fs), self.probe.clone())
    }
}
