use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::task::Task;
use crate::worker::{spawn_worker, Shared};

/// Lifecycle of a [`Scheduler`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Uninitialized,
    Running,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerState::Uninitialized => "uninitialized",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        })
    }
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SchedulerState::Uninitialized,
            1 => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }
}

/// A fixed pool of worker threads draining one FIFO task queue.
///
/// Tasks start in submission order; with more than one worker they may finish
/// in any order. The scheduler is an ordinary value: construct it at startup
/// and share it by reference (or `Arc`) with whatever needs to submit work.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use fifo_pool::{Scheduler, SchedulerConfig};
///
/// let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(2));
/// scheduler.start().unwrap();
///
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..16 {
///     let done = done.clone();
///     scheduler.spawn(move |_worker_id| {
///         done.fetch_add(1, Ordering::Relaxed);
///     }).unwrap();
/// }
///
/// scheduler.await_all();
/// assert_eq!(done.load(Ordering::Relaxed), 16);
/// scheduler.stop().unwrap();
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    // read lock-free so tasks can query it while `stop` is joining
    state: AtomicU8,
    // also serializes `start` against `stop`
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler in the `Uninitialized` state. No threads are spawned
    /// until [`start`](Self::start).
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            config,
            shared: Arc::new(Shared::new()),
            state: AtomicU8::new(SchedulerState::Uninitialized as u8),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker threads.
    ///
    /// Fails with [`SchedulerError::InvalidState`] unless the scheduler is
    /// `Uninitialized`. If a worker cannot be spawned, the workers already
    /// running are joined and the scheduler ends up `Stopped`.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        let state = self.state();
        if state != SchedulerState::Uninitialized {
            return Err(SchedulerError::InvalidState {
                operation: "start",
                state,
            });
        }
        self.config.validate()?;

        self.shared.queue.open();

        let mut handles = Vec::with_capacity(self.config.worker_count);
        for id in 0..self.config.worker_count {
            match spawn_worker(id, self.shared.clone(), &self.config) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    tracing::error!(worker = id, error = %err, "failed to spawn worker");
                    self.set_state(SchedulerState::Stopped);
                    self.shared.queue.close();
                    join_workers(handles);
                    self.shared.queue.drain_discarded();
                    return Err(SchedulerError::Spawn(err));
                }
            }
        }

        tracing::info!(workers = handles.len(), "scheduler started");
        *workers = handles;
        self.set_state(SchedulerState::Running);
        Ok(())
    }

    /// Shut the workers down and join them.
    ///
    /// Tasks already executing run to completion. Tasks still queued are
    /// discarded without running; their count is returned. Call
    /// [`await_all`](Self::await_all) first if every task must run.
    ///
    /// Stopping an already stopped scheduler returns `Ok(0)`. When called from
    /// inside a task (including the last handle being dropped there), the
    /// calling worker is detached instead of joined and exits once that task
    /// returns.
    pub fn stop(&self) -> Result<usize> {
        let mut workers = self.workers.lock();
        match self.state() {
            SchedulerState::Running => {}
            SchedulerState::Stopped => return Ok(0),
            state => {
                return Err(SchedulerError::InvalidState {
                    operation: "stop",
                    state,
                })
            }
        }
        self.set_state(SchedulerState::Stopped);
        let handles = std::mem::take(&mut *workers);

        self.shared.queue.close();
        join_workers(handles);

        let dropped = self.shared.queue.drain_discarded();
        if dropped > 0 {
            tracing::warn!(dropped, "scheduler stopped with queued tasks, discarding them");
        }
        tracing::info!(dropped, "scheduler stopped");
        Ok(dropped)
    }

    /// Append a task to the queue and wake one idle worker. Never blocks on
    /// task execution.
    ///
    /// Fails with [`SchedulerError::InvalidState`] unless the scheduler is
    /// running.
    pub fn submit(&self, task: Task) -> Result<()> {
        match self.shared.queue.push(task) {
            Ok(()) => {
                tracing::trace!("task submitted");
                Ok(())
            }
            Err(_rejected) => Err(SchedulerError::InvalidState {
                operation: "submit",
                state: self.state(),
            }),
        }
    }

    /// Submit a closure; see [`Task::new`].
    pub fn spawn<F>(&self, func: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.submit(Task::new(func))
    }

    /// Block until no task is queued or executing.
    ///
    /// This is a drain barrier, not a snapshot: tasks submitted by other
    /// threads while this call waits are waited for too, as long as they land
    /// before the count reaches zero. Any number of threads may wait at once.
    ///
    /// Calling this from inside a task deadlocks.
    pub fn await_all(&self) {
        self.shared.queue.gate().wait_empty();
    }

    /// Number of worker threads serving the queue: zero before `start` and
    /// once `stop` has begun.
    pub fn thread_count(&self) -> usize {
        match self.state() {
            SchedulerState::Running => self.config.worker_count,
            _ => 0,
        }
    }

    /// Worker count that `start` will use (or used).
    pub fn configured_workers(&self) -> usize {
        self.config.worker_count
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.is_running()
    }

    /// Tasks queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks queued plus tasks currently executing.
    pub fn outstanding(&self) -> usize {
        self.shared.queue.gate().outstanding()
    }

    /// Number of tasks that panicked. Panics are logged and the worker keeps
    /// going.
    pub fn panicked_tasks(&self) -> usize {
        self.shared.panicked.load(Ordering::Relaxed)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(SchedulerConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.state() == SchedulerState::Running {
            let _ = self.stop();
        }
    }
}

fn join_workers(handles: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for handle in handles {
        // a worker cannot join itself, it leaves the loop on its own once
        // the task that stopped the scheduler returns
        if handle.thread().id() == current {
            tracing::warn!(
                thread = ?handle.thread().name(),
                "scheduler stopped from one of its own workers, detaching it"
            );
            continue;
        }
        // task panics are caught inside the loop, so this only fires on
        // failures outside task code
        if handle.join().is_err() {
            tracing::error!("worker thread terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scheduler(workers: usize) -> Scheduler {
        Scheduler::new(SchedulerConfig::default().with_workers(workers))
    }

    #[test]
    fn state_machine() {
        let s = scheduler(2);
        assert_eq!(s.state(), SchedulerState::Uninitialized);
        assert_eq!(s.thread_count(), 0);
        assert!(!s.is_running());

        s.start().unwrap();
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.thread_count(), 2);
        assert!(s.is_running());

        assert_eq!(s.stop().unwrap(), 0);
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.thread_count(), 0);
        assert!(!s.is_running());
    }

    #[test]
    fn misuse_is_reported() {
        let s = scheduler(1);
        assert!(matches!(
            s.stop(),
            Err(SchedulerError::InvalidState {
                operation: "stop",
                state: SchedulerState::Uninitialized
            })
        ));
        assert!(matches!(
            s.spawn(|_| {}),
            Err(SchedulerError::InvalidState {
                operation: "submit",
                ..
            })
        ));

        s.start().unwrap();
        assert!(matches!(
            s.start(),
            Err(SchedulerError::InvalidState {
                operation: "start",
                state: SchedulerState::Running
            })
        ));

        s.stop().unwrap();
        assert!(matches!(
            s.start(),
            Err(SchedulerError::InvalidState {
                state: SchedulerState::Stopped,
                ..
            })
        ));
        assert_eq!(s.stop().unwrap(), 0);
        assert!(matches!(
            s.spawn(|_| {}),
            Err(SchedulerError::InvalidState {
                state: SchedulerState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn zero_workers_fails_start() {
        let s = scheduler(0);
        assert!(matches!(s.start(), Err(SchedulerError::InvalidConfig(_))));
        assert_eq!(s.state(), SchedulerState::Uninitialized);
    }

    #[test]
    fn error_messages_name_operation_and_state() {
        let s = scheduler(1);
        let err = s.stop().unwrap_err();
        assert_eq!(err.to_string(), "cannot stop while scheduler is uninitialized");
    }

    #[test]
    fn worker_ids_within_range() {
        let s = scheduler(3);
        s.start().unwrap();

        let max_id = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            let max_id = max_id.clone();
            s.spawn(move |id| {
                max_id.fetch_max(id, Ordering::SeqCst);
            })
            .unwrap();
        }
        s.await_all();
        assert!(max_id.load(Ordering::SeqCst) < 3);
        s.stop().unwrap();
    }

    #[test]
    fn drop_stops_running_scheduler() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let s = scheduler(2);
            s.start().unwrap();
            let h = hits.clone();
            s.spawn(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            s.await_all();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // the scheduler held the only other clone inside the task
        assert_eq!(Arc::strong_count(&hits), 1);
    }
}
