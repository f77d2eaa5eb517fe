//! Background worker for deferred value destruction.
//!
//! Lazy eviction unlinks a key synchronously but hands the value to this
//! queue; a worker thread drops it and returns its bytes to the allocator
//! at some later point. The eviction loop only observes the queue through
//! [`LazyFree::pending_jobs`], which it polls in the backstop while it
//! waits for freed bytes to land.
//!
//! A job counts as pending from enqueue until its closure has finished
//! running, so a drained queue with a job still executing reports one
//! pending job rather than zero.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::traits::LazyFree;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Job>>,
    wakeup: Condvar,
    pending: AtomicUsize,
    shutdown: AtomicBool,
}

/// Queue of deferred destruction jobs drained by one worker thread.
///
/// # Example
///
/// ```
/// use evictkit::store::LazyFreeQueue;
/// use evictkit::traits::LazyFree;
///
/// let queue = LazyFreeQueue::start();
/// queue.enqueue(|| { /* drop a big value */ });
/// while queue.pending_jobs() > 0 {
///     std::thread::yield_now();
/// }
/// ```
pub struct LazyFreeQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LazyFreeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyFreeQueue")
            .field("pending", &self.pending_jobs())
            .finish()
    }
}

impl Default for LazyFreeQueue {
    fn default() -> Self {
        Self::start()
    }
}

impl LazyFreeQueue {
    /// Spawns the worker thread and returns the queue handle.
    pub fn start() -> Self {
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("lazy-free".into())
            .spawn(move || Self::worker_loop(worker_shared))
            .expect("failed to spawn lazy-free worker");
        Self {
            shared,
            worker: Some(worker),
        }
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock();
                while queue.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
                    shared.wakeup.wait(&mut queue);
                }
                match queue.pop_front() {
                    Some(job) => job,
                    None => return, // shutdown with an empty queue
                }
            };
            job();
            shared.pending.fetch_sub(1, Ordering::Release);
        }
    }

    /// Enqueues one destruction job.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        self.shared.pending.fetch_add(1, Ordering::Release);
        self.shared.queue.lock().push_back(Box::new(job));
        self.shared.wakeup.notify_one();
    }
}

impl LazyFree for LazyFreeQueue {
    fn pending_jobs(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }
}

impl Drop for LazyFreeQueue {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
