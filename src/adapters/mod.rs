// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod fs_local;
pub mod probe_ffprobe;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use exec_ffmpeg::FfmpegAdapter;
pub use fs_local::LocalFsAdapter;
pub use probe_ffprobe::FfprobeAdapter;
pub use toml_config::{TomlConfigAdapter, VidpressConfig};
pub use tracing_log::TracingLogAdapter;
