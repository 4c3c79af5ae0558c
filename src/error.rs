use std::io;

use crate::scheduler::SchedulerState;

/// Errors returned by [`Scheduler`](crate::Scheduler) operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The operation is not allowed in the scheduler's current lifecycle state,
    /// e.g. `start` twice, or `submit` after `stop`.
    #[error("cannot {operation} while scheduler is {state}")]
    InvalidState {
        operation: &'static str,
        state: SchedulerState,
    },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
