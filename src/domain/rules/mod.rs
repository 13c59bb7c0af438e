// Domain rules - Compression status machine

use thiserror::Error;

use crate::domain::errors::CompressionError;
use crate::domain::model::CompressionStatus;

/// Events that move a file through its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The engine was launched for this file
    Start,
    /// Informational progress while compressing
    Progress(f64),
    Complete { compressed_size: u64 },
    Fail(CompressionError),
    Cancel,
    /// Re-enter the queue after a terminal state
    Reset,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Progress(_) => "progress",
            Transition::Complete { .. } => "complete",
            Transition::Fail(_) => "fail",
            Transition::Cancel => "cancel",
            Transition::Reset => "reset",
        }
    }
}

/// A transition that is not allowed from the current status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {transition} a {from} item")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub transition: &'static str,
}

/// Allowed status transitions
///
/// ```text
/// pending ──start──▶ compressing ──complete──▶ completed
///    │                   │ ├──────fail──────▶ failed
///    │                   │ └─────cancel─────▶ cancelled
///    ├──fail (pre-flight)──────────────────▶ failed
///    └──cancel─────────────────────────────▶ cancelled
/// completed | failed | cancelled ──reset──▶ pending
/// ```
pub struct StatusMachine;

impl StatusMachine {
    pub fn next(
        current: &CompressionStatus,
        transition: &Transition,
    ) -> Result<CompressionStatus, InvalidTransition> {
        use CompressionStatus as S;

        let next = match (current, transition) {
            (S::Pending, Transition::Start) => S::Compressing,
            (S::Pending, Transition::Fail(reason)) => S::Failed(reason.clone()),
            (S::Pending, Transition::Cancel) => S::Cancelled,

            (S::Compressing, Transition::Progress(_)) => S::Compressing,
            (S::Compressing, Transition::Complete { .. }) => S::Completed,
            (S::Compressing, Transition::Fail(reason)) => S::Failed(reason.clone()),
            (S::Compressing, Transition::Cancel) => S::Cancelled,

            (status, Transition::Reset) if status.is_terminal() => S::Pending,

            (status, transition) => {
                return Err(InvalidTransition {
                    from: status.label(),
                    transition: transition.name(),
                })
            }
        };

        Ok(next)
    }

    pub fn can_apply(current: &CompressionStatus, transition: &Transition) -> bool {
        Self::next(current, transition).is_ok()
    }
}
