use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::SchedulerConfig;
use crate::queue::TaskQueue;

// state shared between the scheduler handle and its workers
pub struct Shared {
    pub queue: TaskQueue,
    pub panicked: AtomicUsize,
}

impl Shared {
    pub fn new() -> Self {
        Shared {
            queue: TaskQueue::new(),
            panicked: AtomicUsize::new(0),
        }
    }
}

pub fn spawn_worker(
    id: usize,
    shared: Arc<Shared>,
    config: &SchedulerConfig,
) -> io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("{}{}", config.thread_name_prefix, id));
    if let Some(size) = config.stack_size {
        builder = builder.stack_size(size);
    }

    builder.spawn(move || work_loop(id, &shared))
}

fn work_loop(id: usize, shared: &Shared) {
    tracing::debug!(worker = id, "worker started");

    // `pop` returns None once the queue is closed, leftovers stay queued
    while let Some(task) = shared.queue.pop() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run(id))) {
            shared.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                worker = id,
                panic = panic_message(&*payload),
                "task panicked, worker continues"
            );
        }
        drop(task);

        shared.queue.gate().complete_one();
    }

    tracing::debug!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
