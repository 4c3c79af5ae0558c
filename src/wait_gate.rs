use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

// Tracks queued + executing tasks and lets any number of threads block until
// that count drains to zero.
//
// The counter is read on every task completion, so it lives on its own cache
// line. Completions only touch the mutex when a waiter has registered.
//
// `drains` is bumped every time the count reaches zero. A waiter returns once
// it sees a drain that happened after it arrived, even if new submissions
// have already pushed the count back up.
pub struct CompletionGate {
    outstanding: CachePadded<AtomicUsize>,
    drains: CachePadded<AtomicUsize>,
    waiters: CachePadded<AtomicUsize>,
    mutex: Mutex<()>,
    cv: Condvar,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self {
            outstanding: CachePadded::new(AtomicUsize::new(0)),
            drains: CachePadded::new(AtomicUsize::new(0)),
            waiters: CachePadded::new(AtomicUsize::new(0)),
            mutex: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    // called before the task is visible to any worker
    #[inline]
    pub fn add_one(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn complete_one(&self) {
        self.complete_many(1);
    }

    // retire `count` tasks, wake every waiter if that drained the gate
    pub fn complete_many(&self, count: usize) {
        if count == 0 {
            return;
        }
        let prev = self.outstanding.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(prev >= count, "outstanding count underflow");

        if prev == count {
            self.drains.fetch_add(1, Ordering::SeqCst);
            self.notify_all_if_waiters();
        }
    }

    // block until the outstanding count is zero or has drained to zero
    // since this call began
    pub fn wait_empty(&self) {
        let arrived = self.drains.load(Ordering::SeqCst);
        if self.is_drained_since(arrived) {
            return;
        }

        let mut guard = self.mutex.lock();

        // register before re-checking, a completion that misses the
        // registration is guaranteed to be seen by the re-check
        self.waiters.fetch_add(1, Ordering::SeqCst);
        while !self.is_drained_since(arrived) {
            self.cv.wait(&mut guard);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_drained_since(&self, arrived: usize) -> bool {
        self.outstanding() == 0 || self.drains.load(Ordering::SeqCst) != arrived
    }

    fn notify_all_if_waiters(&self) {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }
        let _g = self.mutex.lock();
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn empty_gate_returns_immediately() {
        let gate = CompletionGate::new();
        gate.wait_empty();
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn counts_up_and_down() {
        let gate = CompletionGate::new();
        gate.add_one();
        gate.add_one();
        gate.add_one();
        assert_eq!(gate.outstanding(), 3);

        gate.complete_one();
        gate.complete_many(2);
        assert_eq!(gate.outstanding(), 0);

        gate.complete_many(0);
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn waiter_returns_after_drain_even_if_refilled() {
        let gate = Arc::new(CompletionGate::new());
        gate.add_one();

        let g = gate.clone();
        let waiter = thread::spawn(move || g.wait_empty());

        while gate.waiters.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        // drain and refill back to back; the waiter may re-check after
        // the refill and must still return
        gate.complete_one();
        gate.add_one();

        waiter.join().unwrap();
        assert_eq!(gate.outstanding(), 1);
    }

    #[test]
    fn wakes_every_waiter() {
        let gate = Arc::new(CompletionGate::new());
        gate.add_one();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait_empty())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        gate.complete_one();

        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(gate.outstanding(), 0);
    }
}
