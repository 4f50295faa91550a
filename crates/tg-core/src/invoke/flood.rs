//! Process-wide flood-control gate.
//!
//! A background actor owns the admission queue. Callers enqueue a request for
//! admission and suspend until the actor grants them an in-flight permit.
//! The actor paces admissions (minimum spacing, bounded in-flight calls) and
//! stalls the whole queue whenever any call comes back rate limited.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{Invoker, Middleware, SharedInvoker};
use crate::errors::InvokeError;
use crate::rpc::{Request, Response};

type Admission = oneshot::Sender<OwnedSemaphorePermit>;

/// Upper bound of a single stall, whatever the server asked for.
const MAX_STALL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Minimum spacing between two admissions.
    pub min_interval: Duration,
    /// Calls allowed in flight at once.
    pub max_in_flight: usize,
    /// Pending admissions buffered before callers block on enqueue.
    pub queue_depth: usize,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(35),
            max_in_flight: 8,
            queue_depth: 256,
        }
    }
}

/// The coordination actor. Created and driven by [`FloodGate::start`].
pub struct FloodGate {
    queue: mpsc::Receiver<Admission>,
    penalty: watch::Receiver<Option<Instant>>,
    permits: Arc<Semaphore>,
    options: GateOptions,
    shutdown: CancellationToken,
}

impl FloodGate {
    /// Spawn the actor and return the handle that owns its lifecycle.
    pub fn start(options: GateOptions) -> FloodGateHandle {
        let (tx, queue) = mpsc::channel(options.queue_depth.max(1));
        let (penalty_tx, penalty) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let gate = FloodGate {
            queue,
            penalty,
            permits: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
            options,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(gate.run());
        FloodGateHandle {
            queue: tx,
            penalty: Arc::new(penalty_tx),
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        let mut last_admit: Option<Instant> = None;
        loop {
            let reply = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(reply) => reply,
                    None => break,
                },
            };

            if !self.wait_turn(last_admit).await {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            last_admit = Some(Instant::now());
            if reply.send(permit).is_err() {
                log::trace!("caller left the flood-control queue before admission");
            }
        }

        // Pending admissions are dropped with the receiver, failing their callers.
        self.queue.close();
        log::debug!("flood-control gate stopped");
    }

    /// Sleep until pacing and any server-imposed stall allow the next
    /// admission. Returns `false` when the gate is shutting down.
    async fn wait_turn(&mut self, last_admit: Option<Instant>) -> bool {
        loop {
            let stalled_until = *self.penalty.borrow_and_update();
            let paced_until = last_admit.map(|at| at + self.options.min_interval);
            let deadline = match stalled_until.into_iter().chain(paced_until).max() {
                Some(deadline) if deadline > Instant::now() => deadline,
                _ => return true,
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                changed = self.penalty.changed() => {
                    if changed.is_err() {
                        // No more penalties can arrive; just wait out the deadline.
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return false,
                            _ = sleep_until(deadline) => return true,
                        }
                    }
                }
                _ = sleep_until(deadline) => return true,
            }
        }
    }
}

/// Owner of a running gate: hands out middleware and stops the actor.
#[derive(Clone)]
pub struct FloodGateHandle {
    queue: mpsc::Sender<Admission>,
    penalty: Arc<watch::Sender<Option<Instant>>>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FloodGateHandle {
    /// Stall every admission for `wait`, extending any stall already active.
    pub fn penalize(&self, wait: Duration) {
        penalize(&self.penalty, wait);
    }

    /// Stop the actor and wait for it to exit. Queued callers fail permanently.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                log::warn!("flood-control gate task failed: {err}");
            }
        }
    }
}

impl Middleware for &FloodGateHandle {
    fn wrap(self, inner: SharedInvoker) -> SharedInvoker {
        Arc::new(Gated {
            inner,
            queue: self.queue.clone(),
            penalty: Arc::clone(&self.penalty),
        })
    }
}

fn penalize(penalty: &watch::Sender<Option<Instant>>, wait: Duration) {
    let until = Instant::now() + wait.min(MAX_STALL);
    penalty.send_modify(|current| {
        *current = Some(current.map_or(until, |existing| existing.max(until)));
    });
}

fn gate_stopped() -> InvokeError {
    InvokeError::permanent("flood-control gate stopped")
}

/// Invoker admitted through the gate.
struct Gated {
    inner: SharedInvoker,
    queue: mpsc::Sender<Admission>,
    penalty: Arc<watch::Sender<Option<Instant>>>,
}

#[async_trait]
impl Invoker for Gated {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        let (reply, admitted) = oneshot::channel();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
            sent = self.queue.send(reply) => sent.map_err(|_| gate_stopped())?,
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
            permit = admitted => permit.map_err(|_| gate_stopped())?,
        };

        let result = self.inner.invoke(cancel, request).await;
        drop(permit);

        if let Some(wait) = result.as_ref().err().and_then(InvokeError::retry_after) {
            log::debug!("{} rate limited for {wait:?}, stalling gate", request.method);
            penalize(&self.penalty, wait);
        }
        result
    }
}
