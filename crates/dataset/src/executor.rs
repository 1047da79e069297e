//! Work submission.
//!
//! Nothing in the dataset layer creates threads. Blocking work (opening files,
//! reading and decoding batches) is handed to an [`Executor`] supplied through
//! the scan options.

use futures::channel::oneshot;
use igloo_common::{Error, Result};
use std::fmt;
use std::sync::Arc;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync + fmt::Debug {
    /// Runs `task` to completion, possibly on another thread.
    fn spawn_blocking(&self, task: Task);
}

/// Runs `f` on `executor` and resolves to its result.
///
/// Nothing is queued until the returned future is first polled. If the future
/// is dropped before the queued task starts, the task is skipped.
pub async fn submit<T, F>(executor: Arc<dyn Executor>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    executor.spawn_blocking(Box::new(move || {
        if tx.is_canceled() {
            return;
        }
        let _ = tx.send(f());
    }));
    rx.await.map_err(|_| Error::Cancelled)?
}

/// Executes tasks on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Execution(format!("no tokio runtime available: {e}")))
    }
}

impl Executor for TokioExecutor {
    fn spawn_blocking(&self, task: Task) {
        // The join handle is not needed: results travel back through `submit`.
        let _ = self.handle.spawn_blocking(task);
    }
}

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn spawn_blocking(&self, task: Task) {
        task()
    }
}

/// The I/O execution context of a scan.
#[derive(Debug, Clone)]
pub struct IoContext {
    executor: Arc<dyn Executor>,
}

impl IoContext {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }
}

impl Default for IoContext {
    fn default() -> Self {
        Self::new(Arc::new(InlineExecutor))
    }
}
