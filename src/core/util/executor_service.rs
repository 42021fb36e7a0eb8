// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded worker pool with cooperative cancellation.
//!
//! A run dispatches at most one unit of work at a time into the pool (the
//! tree walk, or the initial input load). The caller blocks until it
//! completes. Cancellation is cooperative: the task polls its
//! [`CancellationToken`] and the pool reports [`TaskError::Cancelled`] when
//! the token was set, so callers can tell a cancelled task from a failed one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::error::{OpFlowError, OpFlowResult};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear the flag so the token can guard the next run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// Outcome of a pooled task that did not succeed
#[derive(Debug)]
pub enum TaskError<E> {
    /// The token was cancelled before or while the task ran
    Cancelled,
    /// The task itself returned an error
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for TaskError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task cancelled"),
            TaskError::Failed(e) => write!(f, "task failed: {e}"),
        }
    }
}

/// Bounded pool executing cancellable units of work
pub struct ExecutorService {
    name: String,
    pool: ThreadPool,
}

impl fmt::Debug for ExecutorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorService")
            .field("name", &self.name)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl ExecutorService {
    /// Create a pool with `threads` named workers (at least one).
    pub fn new(name: impl Into<String>, threads: usize) -> OpFlowResult<Self> {
        let name = name.into();
        let prefix = name.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{prefix}-worker-{i}"))
            .build()
            .map_err(|e| {
                OpFlowError::runtime_with_source(
                    format!("Cannot build worker pool '{name}'"),
                    Box::new(e),
                )
            })?;
        Ok(Self { name, pool })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task` on a pool worker and wait for it.
    ///
    /// The task receives the token to poll. A task that was cancelled
    /// before it started never runs; a task that observes cancellation and
    /// returns an error is reported as `Cancelled` as well.
    pub fn run_cancellable<T, E, F>(
        &self,
        token: &CancellationToken,
        task: F,
    ) -> Result<T, TaskError<E>>
    where
        T: Send,
        E: Send,
        F: FnOnce(&CancellationToken) -> Result<T, E> + Send,
    {
        self.pool.install(|| {
            if token.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            match task(token) {
                Ok(value) => Ok(value),
                Err(_) if token.is_cancelled() => Err(TaskError::Cancelled),
                Err(e) => Err(TaskError::Failed(e)),
            }
        })
    }
}
