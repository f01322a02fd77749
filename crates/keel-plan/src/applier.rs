//! Plan applier loop — serialized revalidate-then-commit.
//!
//! A single long-lived worker, bound to the current leader, pulls pending
//! plans off the queue one at a time, evaluates each against a fresh
//! state snapshot, commits the accepted portion through consensus, and
//! replies to the submitter.
//!
//! Evaluation must stay serialized against this leader's own prior
//! commits: two plans evaluated in parallel against the same snapshot
//! could each fit independently and together over-commit a node. The
//! single-threaded loop guarantees every evaluation sees state that
//! reflects every plan previously applied here.

use std::future::Future;
use std::sync::Arc;

use keel_placement::allocations_fit;
use keel_state::StateStore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PlanError;
use crate::evaluate::{evaluate_plan, FitFn};
use crate::queue::PlanQueue;
use crate::types::AllocUpdateRequest;

/// Commits an accepted plan portion to the replicated log.
///
/// Returns the log index at which the entry became durable. The applier
/// is the only local writer for this request type.
pub trait ConsensusApply: Send + Sync + 'static {
    fn apply_alloc_update(
        &self,
        req: AllocUpdateRequest,
    ) -> impl Future<Output = Result<u64, PlanError>> + Send;
}

/// The plan applier worker.
///
/// Owns the consumer side of the queue; its lifecycle follows leadership.
pub struct PlanApplier<C: ConsensusApply> {
    queue: Arc<PlanQueue>,
    state: StateStore,
    consensus: Arc<C>,
    fit: FitFn,
}

impl<C: ConsensusApply> Clone for PlanApplier<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            state: self.state.clone(),
            consensus: Arc::clone(&self.consensus),
            fit: self.fit,
        }
    }
}

impl<C: ConsensusApply> PlanApplier<C> {
    /// Create an applier using the standard node-fit predicate.
    pub fn new(queue: Arc<PlanQueue>, state: StateStore, consensus: Arc<C>) -> Self {
        Self {
            queue,
            state,
            consensus,
            fit: allocations_fit,
        }
    }

    /// Replace the fit predicate (tests use this to force outcomes).
    pub fn with_fit_fn(mut self, fit: FitFn) -> Self {
        self.fit = fit;
        self
    }

    /// Spawn the applier loop on the runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let applier = self.clone();
        tokio::spawn(async move { applier.run().await })
    }

    /// Stop the loop by closing the queue.
    ///
    /// Outstanding and future submitters see `QueueClosed`; the loop
    /// exits once it observes the close.
    pub async fn stop(&self) {
        self.queue.close().await;
    }

    /// Run the applier loop until the queue closes.
    ///
    /// Evaluation and consensus errors are fatal to the individual plan,
    /// never to the loop.
    pub async fn run(&self) {
        info!("plan applier started");
        loop {
            // Pull the next pending plan; exit if we are no longer leader.
            let pending = match self.queue.dequeue(None).await {
                Ok(pending) => pending,
                Err(_) => break,
            };

            let snap = match self.state.snapshot() {
                Ok(snap) => snap,
                Err(e) => {
                    error!(error = %e, "failed to snapshot state");
                    pending.respond(Err(PlanError::SnapshotFailed(e.to_string())));
                    continue;
                }
            };

            let mut result = match evaluate_plan(&snap, &pending.plan, self.fit) {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, eval_id = %pending.plan.eval_id, "failed to evaluate plan");
                    pending.respond(Err(e));
                    continue;
                }
            };

            // Nothing to commit; the refresh index already carries the
            // staleness signal.
            if result.is_empty() {
                debug!(
                    eval_id = %pending.plan.eval_id,
                    refresh_index = result.refresh_index,
                    "plan evaluated to empty result"
                );
                pending.respond(Ok(result));
                continue;
            }

            let req = AllocUpdateRequest::from_result(&result);
            match self.consensus.apply_alloc_update(req).await {
                Ok(index) => {
                    result.alloc_index = index;
                    debug!(
                        eval_id = %pending.plan.eval_id,
                        alloc_index = index,
                        "plan applied"
                    );
                    pending.respond(Ok(result));
                }
                Err(e) => {
                    error!(error = %e, eval_id = %pending.plan.eval_id, "failed to apply plan");
                    pending.respond(Err(e));
                }
            }
        }
        info!("plan applier stopped");
    }
}
