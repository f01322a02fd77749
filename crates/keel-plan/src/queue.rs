//! Plan queue — FIFO hand-off between schedulers and the applier.
//!
//! Any number of producers enqueue plans; exactly one consumer (the plan
//! applier) dequeues them. Each enqueued plan carries a one-shot reply
//! slot that is written exactly once with the final outcome, on every
//! path: success, evaluation error, apply error, or queue close.
//!
//! The queue is unbounded; enqueue never blocks. If schedulers outrun
//! the applier, reply latency is the backpressure signal.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, Notify};
use tracing::debug;

use crate::error::PlanError;
use crate::types::{Plan, PlanResult};

/// Reply payload delivered to a plan submitter.
type Reply = Result<PlanResult, PlanError>;

/// A plan waiting in the queue, paired with its reply slot.
///
/// `respond` consumes the pending, so the reply is written at most once
/// by construction.
pub struct PendingPlan {
    pub plan: Plan,
    reply: oneshot::Sender<Reply>,
}

impl PendingPlan {
    /// Deliver the outcome to the submitter.
    ///
    /// A dropped ticket (the submitter stopped waiting) is not an error.
    pub fn respond(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

/// Submitter-side handle for one enqueued plan.
pub struct PlanTicket {
    reply: oneshot::Receiver<Reply>,
}

impl PlanTicket {
    /// Block until the applier responds to this plan.
    pub async fn wait(self) -> Result<PlanResult, PlanError> {
        match self.reply.await {
            Ok(reply) => reply,
            // The reply slot was dropped without a response; the queue
            // was torn down.
            Err(_) => Err(PlanError::QueueClosed),
        }
    }
}

/// Queue internals guarded by one lock.
struct Inner {
    pending: VecDeque<PendingPlan>,
    closed: bool,
}

/// Unbounded multi-producer, single-consumer FIFO of pending plans.
pub struct PlanQueue {
    inner: Mutex<Inner>,
    /// Wakes the consumer when a plan arrives or the queue closes.
    available: Notify,
}

impl PlanQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Admit a plan. Never blocks; fails once the queue has closed.
    ///
    /// Concurrent enqueues are serialized by the internal lock; the order
    /// they commit is the order the consumer observes.
    pub async fn enqueue(&self, plan: Plan) -> Result<PlanTicket, PlanError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(PlanError::QueueClosed);
            }
            inner.pending.push_back(PendingPlan { plan, reply: tx });
        }
        self.available.notify_one();
        Ok(PlanTicket { reply: rx })
    }

    /// Pull the next pending plan in FIFO order.
    ///
    /// Blocks until a plan arrives, the timeout elapses (`None` blocks
    /// indefinitely), or the queue closes.
    pub async fn dequeue(&self, timeout: Option<Duration>) -> Result<PendingPlan, PlanError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.next()).await {
                Ok(result) => result,
                Err(_) => Err(PlanError::DequeueTimeout),
            },
            None => self.next().await,
        }
    }

    async fn next(&self) -> Result<PendingPlan, PlanError> {
        loop {
            // Register interest before checking the queue so a notify
            // landing between the check and the await is not lost.
            let notified = self.available.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(pending) = inner.pending.pop_front() {
                    return Ok(pending);
                }
                if inner.closed {
                    return Err(PlanError::QueueClosed);
                }
            }
            notified.await;
        }
    }

    /// Stop accepting plans and fail everything still enqueued.
    ///
    /// Idempotent. Called on leadership loss; pending submitters unblock
    /// with `QueueClosed`.
    pub async fn close(&self) {
        let drained: Vec<PendingPlan> = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.pending.drain(..).collect()
        };
        debug!(dropped = drained.len(), "plan queue closed");
        for pending in drained {
            pending.respond(Err(PlanError::QueueClosed));
        }
        // notify_one leaves a stored permit even if the consumer has not
        // polled yet, unlike notify_waiters.
        self.available.notify_one();
    }

    /// Drop everything currently enqueued without closing the queue.
    ///
    /// Each dropped plan is signalled with `QueueClosed`.
    pub async fn flush(&self) {
        let drained: Vec<PendingPlan> = {
            let mut inner = self.inner.lock().await;
            inner.pending.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(dropped = drained.len(), "plan queue flushed");
        }
        for pending in drained {
            pending.respond(Err(PlanError::QueueClosed));
        }
    }

    /// Number of plans currently waiting.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.pending.is_empty()
    }
}

impl Default for PlanQueue {
    fn default() -> Self {
        Self::new()
    }
}
