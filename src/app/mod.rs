// Application layer - Queue scheduling, intake and wiring

pub mod container;
pub mod intake;
pub mod scheduler;

pub use container::AppContainer;
pub use intake::{expand_inputs, MediaIntake};
pub use scheduler::{BatchSummary, Enqueued, QueueError, QueueEvent, Scheduler, SchedulerConfig};
