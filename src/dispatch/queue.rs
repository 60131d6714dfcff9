// src/dispatch/queue.rs

//! Serial dispatch queues.
//!
//! A queue is a FIFO of synchronous tasks drained by a single async task on
//! the dispatcher's runtime. Because one drain loop runs one task at a time,
//! tasks submitted to the same queue never overlap and complete in the order
//! they were submitted. Separate queues are independent tokio tasks and are
//! scheduled in parallel.
//!
//! While a task runs, the queue's label is recorded in a thread local so that
//! code can detect it is executing on a queue (see [`DispatchQueue::current`]).
//! Blocking invocations use this to refuse to park a queue worker.

use std::any::Any;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::{log_debug, log_error, Error, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CURRENT_QUEUE: RefCell<Option<Arc<str>>> = const { RefCell::new(None) };
}

/// Handle to a serial task queue.
///
/// Cheap to clone. The queue shuts down once every handle is dropped and the
/// already submitted tasks have run.
#[derive(Clone)]
pub struct DispatchQueue {
    // ---
    label: Arc<str>,
    tx: mpsc::UnboundedSender<Task>,
}

impl DispatchQueue {
    // ---

    pub(crate) fn spawn(handle: &Handle, label: String) -> Self {
        // ---
        let label: Arc<str> = Arc::from(label);
        let (tx, rx) = mpsc::unbounded_channel();

        handle.spawn(drain(label.clone(), rx));

        Self { label, tx }
    }

    /// Enqueue a task for sequential execution on this queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the queue's runtime has gone away.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // ---
        self.tx
            .send(Box::new(task))
            .map_err(|_| Error::QueueClosed(self.label.to_string()))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label of the queue whose task is running on this thread, if any.
    pub fn current() -> Option<Arc<str>> {
        // ---
        CURRENT_QUEUE.with(|current| current.borrow().clone())
    }

    /// Whether the calling thread is currently running a task of this queue.
    pub fn is_current(&self) -> bool {
        // ---
        Self::current().is_some_and(|label| Arc::ptr_eq(&label, &self.label))
    }
}

/// Marks the current thread as running a task of `label` until dropped.
struct QueueScope {
    previous: Option<Arc<str>>,
}

impl QueueScope {
    fn enter(label: &Arc<str>) -> Self {
        // ---
        let previous = CURRENT_QUEUE.with(|current| current.replace(Some(label.clone())));
        Self { previous }
    }
}

impl Drop for QueueScope {
    fn drop(&mut self) {
        // ---
        let previous = self.previous.take();
        CURRENT_QUEUE.with(|current| *current.borrow_mut() = previous);
    }
}

async fn drain(label: Arc<str>, mut rx: mpsc::UnboundedReceiver<Task>) {
    // ---
    while let Some(task) = rx.recv().await {
        let _scope = QueueScope::enter(&label);

        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
            log_error!("task on dispatch queue {} panicked: {}", label, panic_message(&*panic));
        }
    }

    log_debug!("dispatch queue {} drained", label);
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    // ---
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
