//! Executor for delegated handshake tasks.
//!
//! Certificate verification and key exchange can be expensive; a secure
//! channel can hand that processing to this executor instead of running it
//! inline on the thread driving the handshake.

use crate::reactor::workers::{JobHandle, WorkerPool};

/// Dedicated thread pool for delegated TLS processing.
pub struct TaskExecutor {
    pool: WorkerPool,
}

impl TaskExecutor {
    /// Creates an executor scaling up to `max_threads`.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero.
    #[must_use]
    pub fn new(max_threads: usize) -> Self {
        Self {
            pool: WorkerPool::new("tls-task", 0, max_threads),
        }
    }

    /// Runs a delegated task on some executor thread.
    pub fn execute<F>(&self, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(f)
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor").finish_non_exhaustive()
    }
}
