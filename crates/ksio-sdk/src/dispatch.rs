//! Delivery of completion callbacks onto a designated execution context.
//!
//! The serializer resolves results on runtime worker threads. Applications
//! with a thread that owns their state (a UI or main loop) route callbacks
//! through a [`ContextDispatcher`] and drain them on that thread with
//! [`ContextLoop`]. Ordering between callbacks is not guaranteed.

use std::io;
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

/// A completion callback ready to run.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callbacks to run on some execution context.
pub trait CompletionDispatcher: Send + Sync + 'static {
    /// Schedule `callback` to run later.
    fn dispatch(&self, callback: Callback);
}

/// Runs callbacks immediately on the thread that resolved the operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineDispatcher;

impl CompletionDispatcher for InlineDispatcher {
    fn dispatch(&self, callback: Callback) {
        callback();
    }
}

/// Sends callbacks to a [`ContextLoop`].
#[derive(Clone, Debug)]
pub struct ContextDispatcher {
    tx: mpsc::UnboundedSender<Callback>,
}

impl CompletionDispatcher for ContextDispatcher {
    fn dispatch(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            debug!("context loop closed; completion callback dropped");
        }
    }
}

/// Receiving end of a designated execution context.
///
/// Drive it from the owning thread with [`run_pending`](Self::run_pending),
/// from an async task with [`run`](Self::run), or hand it a dedicated OS
/// thread with [`spawn_thread`](Self::spawn_thread).
#[derive(Debug)]
pub struct ContextLoop {
    rx: mpsc::UnboundedReceiver<Callback>,
}

/// Create a connected dispatcher and loop.
pub fn context() -> (ContextDispatcher, ContextLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ContextDispatcher { tx }, ContextLoop { rx })
}

impl ContextLoop {
    /// Run every callback queued so far without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Run callbacks as they arrive until every dispatcher is dropped.
    pub async fn run(mut self) {
        while let Some(callback) = self.rx.recv().await {
            callback();
        }
    }

    /// Run callbacks on a dedicated, named OS thread until every dispatcher
    /// is dropped.
    pub fn spawn_thread(mut self, name: &str) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(callback) = self.rx.blocking_recv() {
                callback();
            }
            debug!("context loop finished");
        })
    }
}
