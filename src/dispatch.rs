//! Listener callback delivery.
//!
//! Queries never call listeners directly: every callback is wrapped in a [`Task`]
//! and handed to a [`Dispatcher`], which runs tasks in submission order on
//! whatever execution context it owns.

use crate::error::{GeoQueryError, Result};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks later, in the order they were submitted.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: Task);
}

/// Runs every task inline on the submitting thread.
///
/// Queries still hand tasks over outside their lock, so listeners may call back
/// into the query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateDispatcher;

impl Dispatcher for ImmediateDispatcher {
    fn dispatch(&self, task: Task) {
        task();
    }
}

/// Runs tasks on one dedicated worker thread.
///
/// Dropping the dispatcher lets the worker finish the queued tasks and joins it.
pub struct ThreadDispatcher {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl ThreadDispatcher {
    pub fn new() -> Result<Self> {
        Self::with_name("geoquery-dispatch")
    }

    pub fn with_name(name: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .map_err(|e| GeoQueryError::Dispatch(format!("cannot spawn worker: {}", e)))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Some(worker),
        })
    }

    /// Whether the caller is running on the worker thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, task: Task) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(task).is_err() {
                    log::warn!("dispatch worker has stopped, dropping listener callback");
                }
            }
            None => log::warn!("dispatcher shut down, dropping listener callback"),
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.take() {
            // A task holding the last reference cannot join its own thread.
            if thread::current().id() != self.worker_id && worker.join().is_err() {
                log::warn!("dispatch worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDispatcher")
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

/// Runs tasks on a single consumer task of a tokio runtime.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
}

#[cfg(feature = "tokio")]
impl TokioDispatcher {
    /// Spawn the consumer on `handle`.
    pub fn new(handle: &tokio::runtime::Handle) -> Self {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
        });
        Self { sender }
    }

    /// Spawn the consumer on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| GeoQueryError::Dispatch(e.to_string()))?;
        Ok(Self::new(&handle))
    }
}

#[cfg(feature = "tokio")]
impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, task: Task) {
        if self.sender.send(task).is_err() {
            log::warn!("tokio dispatcher stopped, dropping listener callback");
        }
    }
}
