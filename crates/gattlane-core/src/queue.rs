//! Single-worker command lane
//!
//! Every task runs against state owned by one worker task, strictly one at a
//! time and in submission order. A task that waits on a completion cell holds
//! the lane for the whole wait, which is what the radio requires: it can only
//! process one GATT, advertise or scan request at a time.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{BleError, Result};

type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

fn job<S, F>(f: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

// ----------------------------------------------------------------------------
// Task Handle
// ----------------------------------------------------------------------------

/// Handle to the result of a submitted task
///
/// The task is queued when it is submitted, not when the handle is polled, so
/// two submissions made back to back always run in that order.
#[must_use = "the task runs regardless, but its result is lost if the handle is dropped"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BleError::LaneClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ----------------------------------------------------------------------------
// Command Queue
// ----------------------------------------------------------------------------

/// Serialized execution lane over worker-owned state `S`
pub struct CommandQueue<S> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job<S>>,
    submitted: Arc<AtomicU64>,
    worker: Option<JoinHandle<S>>,
}

impl<S: Send + 'static> CommandQueue<S> {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(name: impl Into<Arc<str>>, state: S) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_lane(Arc::clone(&name), state, rx));
        info!(lane = %name, "command lane started");

        Self {
            name,
            tx,
            submitted: Arc::new(AtomicU64::new(0)),
            worker: Some(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tasks submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Queue a task. It runs after every previously submitted task has finished.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let (result_tx, rx) = oneshot::channel();
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed);

        let queued = job(move |state: &mut S| {
            Box::pin(async move {
                debug!(task = seq, "lane task started");
                let outcome = task(state).await;
                if result_tx.send(outcome).is_err() {
                    debug!(task = seq, "caller dropped its task handle");
                }
            })
        });

        if self.tx.send(queued).is_err() {
            error!(lane = %self.name, "submit after the lane worker stopped");
        }
        TaskHandle { rx }
    }

    /// Stop accepting tasks, drain the queue and hand back the worker state
    pub async fn shutdown(self) -> Option<S> {
        let CommandQueue {
            name, tx, worker, ..
        } = self;
        drop(tx);
        match worker?.await {
            Ok(state) => Some(state),
            Err(e) => {
                error!(lane = %name, "lane worker terminated abnormally: {}", e);
                None
            }
        }
    }
}

async fn run_lane<S>(name: Arc<str>, mut state: S, mut rx: mpsc::UnboundedReceiver<Job<S>>) -> S
where
    S: Send + 'static,
{
    while let Some(queued) = rx.recv().await {
        let work = queued(&mut state);
        if AssertUnwindSafe(work).catch_unwind().await.is_err() {
            error!(lane = %name, "lane task panicked; continuing with the next task");
        }
    }
    info!(lane = %name, "command lane drained");
    state
}
