// Fifo-Pool: fixed worker pool over one ordered task queue
// - Tasks start in submission order, finish in any order
// - Submission never blocks and is safe from any thread
// - `await_all` drains the queue: it returns once nothing is queued or running
// - Panicking tasks are logged and counted, the worker keeps going
//
// Limitations
// - No priorities, cancellation, dependencies or work stealing
// - The queue is unbounded; producers faster than the workers grow memory
// - Tasks still queued when `stop` runs are discarded, not executed
mod config;
mod error;
mod queue;
mod scheduler;
mod task;
mod wait_gate;
mod worker;

pub use config::{SchedulerConfig, ENV_THREAD_PREFIX, ENV_WORKERS};
pub use error::{Result, SchedulerError};
pub use scheduler::{Scheduler, SchedulerState};
pub use task::Task;

// convenience function to create and start a scheduler sized to the machine
pub fn new() -> Result<Scheduler> {
    start_with(SchedulerConfig::default())
}

// create and start a scheduler with a specific worker count
pub fn with_workers(worker_count: usize) -> Result<Scheduler> {
    start_with(SchedulerConfig::default().with_workers(worker_count))
}

fn start_with(config: SchedulerConfig) -> Result<Scheduler> {
    let scheduler = Scheduler::new(config);
    scheduler.start()?;
    Ok(scheduler)
}
