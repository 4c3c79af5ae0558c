use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::task::Task;
use crate::wait_gate::CompletionGate;

// Unbounded FIFO of pending tasks shared by all workers.
//
// `running` is only written while `tasks` is locked, so a worker that saw
// `running == true` under the lock is guaranteed to be waiting on the condvar
// before shutdown can broadcast.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    task_available: Condvar,
    running: AtomicBool,
    gate: CompletionGate,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            tasks: Mutex::new(VecDeque::new()),
            task_available: Condvar::new(),
            running: AtomicBool::new(false),
            gate: CompletionGate::new(),
        }
    }

    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn open(&self) {
        let _tasks = self.tasks.lock();
        self.running.store(true, Ordering::Release);
    }

    // returns the task back when the queue is closed
    pub fn push(&self, task: Task) -> Result<(), Task> {
        let mut tasks = self.tasks.lock();
        if !self.running.load(Ordering::Acquire) {
            return Err(task);
        }

        // count before the task becomes visible, so a concurrent drain
        // barrier can never observe zero while this task is pending
        self.gate.add_one();
        tasks.push_back(task);
        drop(tasks);

        self.task_available.notify_one();
        Ok(())
    }

    // block until a task is available; `None` once the queue is closed,
    // even if tasks remain
    pub fn pop(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        loop {
            if !self.running.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }
            self.task_available.wait(&mut tasks);
        }
    }

    // stop accepting and handing out work, wake every sleeping worker
    pub fn close(&self) {
        let _tasks = self.tasks.lock();
        self.running.store(false, Ordering::Release);
        self.task_available.notify_all();
    }

    // discard whatever is still queued and retire it from the gate
    pub fn drain_discarded(&self) -> usize {
        let dropped = std::mem::take(&mut *self.tasks.lock());
        let count = dropped.len();
        self.gate.complete_many(count);
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}
