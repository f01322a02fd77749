//! keel-plan — the leader's plan application pipeline.
//!
//! Schedulers propose plans: batches of per-node allocation placements
//! and evictions, computed from a possibly stale view of the cluster.
//! Before a plan touches replicated state it is revalidated against a
//! fresh snapshot and committed through consensus as a single linearized
//! operation. That serialized revalidate-then-commit loop is what keeps
//! concurrent schedulers from over-committing a node.
//!
//! # Components
//!
//! - **`queue`** — unbounded FIFO hand-off between schedulers and the
//!   applier; each plan carries a one-shot reply slot
//! - **`evaluate`** — decides which per-node portions of a plan still fit,
//!   pure over a state snapshot
//! - **`applier`** — the single long-lived worker that evaluates, commits
//!   via the [`ConsensusApply`] seam, and replies to the submitter
//!
//! # Data flow
//!
//! ```text
//! Scheduler ─ enqueue(plan) ─▶ PlanQueue ─ dequeue ─▶ PlanApplier
//!                                                        │ evaluate(snapshot)
//!                                                        │ consensus.apply_alloc_update
//!            ◀─────────────── PlanTicket::wait ──────────┘ respond
//! ```

pub mod applier;
pub mod error;
pub mod evaluate;
pub mod queue;
pub mod types;

pub use applier::{ConsensusApply, PlanApplier};
pub use error::PlanError;
pub use evaluate::{evaluate_plan, FitFn};
pub use queue::{PendingPlan, PlanQueue, PlanTicket};
pub use types::{AllocUpdateRequest, Plan, PlanResult};
