//! vidpress library
//!
//! Batch video compression driven by an external FFmpeg process: a queue of
//! files, one supervised engine run per file, progress from the engine's
//! machine-readable output, and cancellation that always resolves to exactly
//! one outcome.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::{AppContainer, BatchSummary, QueueEvent, Scheduler, SchedulerConfig};
pub use domain::errors::{CompressionError, ErrorKind};
pub use domain::model::{
    Codec, CompressionConfig, CompressionStatus, HardwareBackend, Outcome, SourceLocation, VideoFile,
    VideoFileId,
};
pub use engine::{JobHandle, ProcessSupervisor, SupervisorConfig};
pub use error::{VidpressError, VidpressResult};
