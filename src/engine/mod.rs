//! Compression engine: argument building, progress parsing, exit
//! classification and per-run process supervision

pub mod exit;
pub mod invocation;
pub mod progress;
pub mod supervisor;

pub use exit::{ExitClassifier, ExitVerdict};
pub use invocation::InvocationBuilder;
pub use progress::ProgressParser;
pub use supervisor::{JobHandle, ProcessSupervisor, SupervisorConfig, DEFAULT_GRACE_PERIOD};
