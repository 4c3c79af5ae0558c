use std::fmt;
use std::sync::Arc;

type TaskFn = dyn Fn(usize) + Send + Sync + 'static;

/// A unit of work handed to the scheduler.
///
/// The callable receives the id of the worker executing it (`0..thread_count`),
/// which tasks may use to pick per-worker scratch state. A `Task` is immutable
/// once built; cloning only bumps a reference count and every clone shares the
/// same callable.
///
/// The scheduler provides no synchronization for anything a task captures.
/// Shared state must carry its own, or submitters must partition the work so
/// no two running tasks touch the same memory.
#[derive(Clone)]
pub struct Task {
    func: Arc<TaskFn>,
}

impl Task {
    /// Wrap a closure.
    ///
    /// ```rust
    /// use fifo_pool::Task;
    ///
    /// let task = Task::new(|worker_id| {
    ///     let _ = worker_id;
    /// });
    /// task.run(0);
    /// ```
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Task {
            func: Arc::new(func),
        }
    }

    /// Build a task from a plain function and a shared context.
    ///
    /// The context is kept alive by the task itself, so it outlives every
    /// execution regardless of what the submitter does afterwards.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use fifo_pool::Task;
    ///
    /// fn bump(counter: &AtomicUsize, _worker_id: usize) {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// }
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let task = Task::with_context(counter.clone(), bump);
    /// task.run(0);
    /// task.run(1);
    /// assert_eq!(counter.load(Ordering::Relaxed), 2);
    /// ```
    pub fn with_context<T>(context: Arc<T>, func: fn(&T, usize)) -> Self
    where
        T: Send + Sync + 'static,
    {
        Task::new(move |worker_id| func(&context, worker_id))
    }

    /// Invoke the callable on behalf of `worker_id`.
    #[inline]
    pub fn run(&self, worker_id: usize) {
        (self.func)(worker_id)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("func", &Arc::as_ptr(&self.func))
            .finish()
    }
}
