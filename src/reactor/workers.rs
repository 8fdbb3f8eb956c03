//! Worker pool executing dispatched operations.
//!
//! Handler code never runs on the polling thread. Every readiness event the
//! reactor classifies is packaged as a job and executed here, on a pool of OS
//! threads that scales lazily between a minimum and maximum. Idle threads
//! above the minimum retire after a timeout.

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    min_threads: usize,
    max_threads: usize,
    active_threads: AtomicUsize,
    busy_threads: AtomicUsize,
    pending_count: AtomicUsize,
    queue: SegQueue<QueuedJob>,
    shutdown: AtomicBool,
    /// Parks idle workers; paired with `park_mutex`.
    park: Condvar,
    park_mutex: Mutex<()>,
    idle_timeout: Duration,
    thread_name_prefix: String,
    thread_handles: Mutex<Vec<JoinHandle<()>>>,
}

struct QueuedJob {
    work: Job,
    completion: Arc<JobCompletion>,
}

struct JobCompletion {
    done: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl JobCompletion {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    fn signal(&self) {
        self.done.store(true, Ordering::Release);
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.done.load(Ordering::Acquire) {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock();
        while !self.done.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.condvar.wait_for(&mut guard, remaining);
        }
        true
    }

    fn wait(&self) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.done.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }
}

/// Handle for one submitted job.
pub struct JobHandle {
    completion: Arc<JobCompletion>,
}

impl JobHandle {
    /// True once the job has run (or was dropped at shutdown).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.done.load(Ordering::Acquire)
    }

    /// Blocks until the job has run.
    pub fn wait(&self) {
        self.completion.wait();
    }

    /// Blocks until the job has run or the timeout elapses; returns whether
    /// it completed.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion.wait_timeout(timeout)
    }
}

/// Fixed-bound lazy thread pool.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_jobs",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool with the given thread bounds.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero.
    #[must_use]
    pub fn new(name: &str, min_threads: usize, max_threads: usize) -> Self {
        Self::with_idle_timeout(name, min_threads, max_threads, DEFAULT_IDLE_TIMEOUT)
    }

    /// Creates a pool with explicit idle-retirement timeout.
    #[must_use]
    pub fn with_idle_timeout(
        name: &str,
        min_threads: usize,
        max_threads: usize,
        idle_timeout: Duration,
    ) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        let max_threads = max_threads.max(min_threads);

        let inner = Arc::new(PoolInner {
            min_threads,
            max_threads,
            active_threads: AtomicUsize::new(0),
            busy_threads: AtomicUsize::new(0),
            pending_count: AtomicUsize::new(0),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            park: Condvar::new(),
            park_mutex: Mutex::new(()),
            idle_timeout,
            thread_name_prefix: name.to_string(),
            thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
        });

        let pool = Self { inner };
        for _ in 0..min_threads {
            spawn_worker(&pool.inner);
        }
        pool
    }

    /// Submits a job for execution on some pool thread.
    pub fn execute<F>(&self, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let completion = Arc::new(JobCompletion::new());
        self.inner.queue.push(QueuedJob {
            work: Box::new(f),
            completion: Arc::clone(&completion),
        });
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);

        maybe_spawn_worker(&self.inner);
        {
            let _guard = self.inner.park_mutex.lock();
            self.inner.park.notify_one();
        }

        JobHandle { completion }
    }

    /// Number of jobs waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }

    /// Stops accepting work and drains already-queued jobs.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _guard = self.inner.park_mutex.lock();
        self.inner.park.notify_all();
    }

    /// Shuts down and waits up to `timeout` for all workers to exit.
    ///
    /// Returns `true` if every worker exited within the timeout.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = Instant::now() + timeout;

        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            {
                let _guard = self.inner.park_mutex.lock();
                self.inner.park.notify_all();
            }
            thread::sleep(Duration::from_millis(10).min(remaining));
        }

        let mut handles = self.inner.thread_handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

fn spawn_worker(inner: &Arc<PoolInner>) {
    let inner_clone = Arc::clone(inner);
    let worker_id = inner.active_threads.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{}", inner.thread_name_prefix, worker_id);

    let spawned = thread::Builder::new().name(name).spawn(move || {
        worker_loop(&inner_clone);
        inner_clone.active_threads.fetch_sub(1, Ordering::Relaxed);
    });

    match spawned {
        Ok(handle) => inner.thread_handles.lock().push(handle),
        Err(err) => {
            inner.active_threads.fetch_sub(1, Ordering::Relaxed);
            tracing::error!(error = %err, "failed to spawn worker thread");
        }
    }
}

fn maybe_spawn_worker(inner: &Arc<PoolInner>) {
    let active = inner.active_threads.load(Ordering::Relaxed);
    let busy = inner.busy_threads.load(Ordering::Relaxed);
    let pending = inner.pending_count.load(Ordering::Relaxed);
    if active < inner.max_threads && busy >= active && pending > 0 {
        spawn_worker(inner);
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            (job.work)();
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            job.completion.signal();
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let mut guard = inner.park_mutex.lock();
        // A job pushed between the failed pop and this lock was notified
        // with no waiter present; re-check under the lock before parking.
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            drop(guard);
            continue;
        }
        if inner.active_threads.load(Ordering::Relaxed) > inner.min_threads {
            let result = inner.park.wait_for(&mut guard, inner.idle_timeout);
            drop(guard);
            if result.timed_out()
                && inner.queue.is_empty()
                && inner.active_threads.load(Ordering::Relaxed) > inner.min_threads
            {
                break;
            }
        } else {
            inner.park.wait(&mut guard);
        }
    }
}
