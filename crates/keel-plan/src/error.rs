//! Error types for the plan pipeline.
//!
//! A plan that simply does not fit is NOT an error: it evaluates to an
//! empty (or partial) result whose `refresh_index` tells the scheduler to
//! retry against fresher state. An error means something broke, and the
//! submitter should back off rather than immediately retry.

use keel_state::NodeId;
use thiserror::Error;

/// Errors surfaced to plan submitters and the applier loop.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The queue stopped accepting work; this server is no longer leader.
    #[error("plan queue is closed")]
    QueueClosed,

    /// No plan arrived within the dequeue timeout.
    #[error("timed out waiting for a plan")]
    DequeueTimeout,

    #[error("failed to snapshot state: {0}")]
    SnapshotFailed(String),

    #[error("failed to get node '{node_id}': {reason}")]
    NodeLookupFailed { node_id: NodeId, reason: String },

    #[error("failed to get existing allocations for '{node_id}': {reason}")]
    AllocLookupFailed { node_id: NodeId, reason: String },

    #[error("failed to get index for table '{table}': {reason}")]
    IndexLookupFailed { table: String, reason: String },

    #[error("consensus apply failed: {0}")]
    ConsensusFailed(String),
}
