//! Dispatch runtime.
//!
//! A [`Dispatcher`] owns (or borrows) the worker thread pool every fastbin
//! component runs on and hands out [`DispatchQueue`]s: serial executors that
//! run their tasks one at a time, in submission order, while many queues
//! make progress in parallel across the pool.
//!
//! The dispatcher is the explicit context object shared by a
//! [`ServerInvoker`](crate::ServerInvoker) and a
//! [`ClientInvoker`](crate::ClientInvoker). Construct it once and pass
//! clones to both.

mod queue;

pub use queue::DispatchQueue;

pub(crate) use queue::panic_message;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::{log_debug, Error, Result};

/// Shared worker pool and queue factory.
///
/// Cheap to clone (internally `Arc`-backed). When the dispatcher owns its
/// runtime, the runtime is shut down once the last clone is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    handle: Handle,
    runtime: Option<Runtime>,
    next_queue_id: AtomicU64,
}

impl Dispatcher {
    // ---

    /// Build a dispatcher backed by its own multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the runtime cannot be created.
    pub fn new(worker_threads: usize) -> Result<Self> {
        // ---
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("fastbin-dispatch")
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(e.to_string()))?;

        log_debug!("dispatcher started with {} worker threads", worker_threads.max(1));

        Ok(Self {
            inner: Arc::new(Inner {
                handle: runtime.handle().clone(),
                runtime: Some(runtime),
                next_queue_id: AtomicU64::new(0),
            }),
        })
    }

    /// Run on an existing runtime instead of owning one.
    pub fn from_handle(handle: Handle) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                handle,
                runtime: None,
                next_queue_id: AtomicU64::new(0),
            }),
        }
    }

    /// Run on the runtime the caller is currently executing in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        // ---
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| Error::Runtime(e.to_string()))
    }

    /// Create a new serial queue.
    ///
    /// The label shows up in logs and in [`DispatchQueue::current`]; a
    /// numeric suffix keeps labels unique per dispatcher.
    pub fn create_queue(&self, label: impl AsRef<str>) -> DispatchQueue {
        // ---
        let id = self.inner.next_queue_id.fetch_add(1, Ordering::Relaxed);
        DispatchQueue::spawn(&self.inner.handle, format!("{}#{id}", label.as_ref()))
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        // ---
        self.inner.handle.spawn(future)
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.inner.handle
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        // shutdown_background never blocks, so dropping the last clone from
        // inside an async context is fine.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_owned_runtime_runs_queues() {
        // ---
        let dispatcher = Dispatcher::new(2).unwrap();
        let queue = dispatcher.create_queue("test");

        let (tx, rx) = std::sync::mpsc::channel();
        queue.submit(move || tx.send(42).unwrap()).unwrap();

        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[test]
    fn test_current_outside_runtime_fails() {
        // ---
        assert!(matches!(Dispatcher::current(), Err(Error::Runtime(_))));
    }

    #[tokio::test]
    async fn test_current_inside_runtime() {
        // ---
        let dispatcher = Dispatcher::current().unwrap();
        let queue = dispatcher.create_queue("inline");
        assert!(queue.label().starts_with("inline#"));
    }
}
