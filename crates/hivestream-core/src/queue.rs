//! Per-contract execution queue.
//!
//! Every registered contract owns one queue. Invocations are run strictly one
//! at a time in submission order, so contract code that reads and then writes
//! its own state (balances, pending payouts) never interleaves with itself.
//! Different contracts have different queues and run concurrently.
//!
//! ```text
//! submit(a) ─┐
//! submit(b) ─┼─► VecDeque [a, b, c] ──► drain task: await a; await b; await c; exit
//! submit(c) ─┘
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::StreamerError;

type Job = BoxFuture<'static, ()>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    draining: bool,
}

/// FIFO serializer for one contract's invocations.
#[derive(Clone)]
pub struct ExecutionQueue {
    label: Arc<str>,
    state: Arc<Mutex<QueueState>>,
}

impl ExecutionQueue {
    /// Create an empty queue. `label` names the owner in logs and errors.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Arc::from(label.into()),
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Enqueue `fut` and return a [`Ticket`] for its outcome.
    ///
    /// Starts a drain task on the current tokio runtime if none is running.
    /// A failing or panicking invocation resolves its own ticket with an
    /// error; the next queued invocation still runs.
    pub fn submit<F, T>(&self, fut: F) -> Ticket<T>
    where
        F: Future<Output = Result<T, StreamerError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let label = self.label.clone();

        let job: Job = Box::pin(async move {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(StreamerError::handler(&*label, "invocation panicked")),
            };
            if let Err(e) = &outcome {
                warn!(contract = %label, error = %e, "queued invocation failed");
            }
            // The submitter may have dropped its ticket; that is fine.
            let _ = tx.send(outcome);
        });

        let start_drain = {
            let mut state = self.state.lock().unwrap();
            state.jobs.push_back(job);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if start_drain {
            debug!(contract = %self.label, "starting drain task");
            tokio::spawn(drain(self.state.clone()));
        }

        Ticket {
            label: self.label.clone(),
            rx,
        }
    }

    /// Number of invocations waiting to run (excluding the running one).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while a drain task is alive.
    pub fn is_draining(&self) -> bool {
        self.state.lock().unwrap().draining
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

async fn drain(state: Arc<Mutex<QueueState>>) {
    loop {
        let job = {
            let mut guard = state.lock().unwrap();
            match guard.jobs.pop_front() {
                Some(job) => job,
                None => {
                    guard.draining = false;
                    return;
                }
            }
        };
        job.await;
    }
}

/// Handle to the outcome of a queued invocation.
///
/// Awaiting the ticket is optional; dropping it does not cancel the
/// invocation.
#[must_use = "a ticket does nothing unless awaited; drop it explicitly to fire and forget"]
pub struct Ticket<T> {
    label: Arc<str>,
    rx: oneshot::Receiver<Result<T, StreamerError>>,
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, StreamerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let label = self.label.clone();
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StreamerError::Aborted {
                reason: format!("queue for '{label}' dropped the invocation"),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
