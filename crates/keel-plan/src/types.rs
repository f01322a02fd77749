//! Plan and plan-result types exchanged with schedulers and consensus.

use std::collections::HashMap;

use keel_state::{Allocation, AllocationId, EvalId, JobId, NodeId};
use serde::{Deserialize, Serialize};

/// A batch proposal from a scheduler: per-node placements and evictions.
///
/// The pipeline reads plans, never mutates them. `priority`, `eval_id`,
/// and `job_id` are forwarded opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// New allocations to place, grouped by target node.
    pub node_allocation: HashMap<NodeId, Vec<Allocation>>,
    /// IDs of allocations to evict, grouped by node.
    pub node_evict: HashMap<NodeId, Vec<AllocationId>>,
    /// When true, either every targeted node accepts its full slice or
    /// the plan is rejected whole.
    pub all_at_once: bool,
    /// Scheduler-assigned priority. Carried, never interpreted here.
    pub priority: i32,
    /// The scheduler evaluation that produced this plan.
    pub eval_id: EvalId,
    pub job_id: JobId,
}

/// The accepted subset of a plan plus advisory indices.
///
/// Empty outer maps are legal and mean "nothing to do".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// Placements that passed revalidation, grouped by node.
    pub node_allocation: HashMap<NodeId, Vec<Allocation>>,
    /// Evictions that passed revalidation, grouped by node.
    pub node_evict: HashMap<NodeId, Vec<AllocationId>>,
    /// Minimum log index the submitter must observe before retrying the
    /// rejected portion. Zero when the plan was accepted whole.
    pub refresh_index: u64,
    /// Log index at which the accepted portion became durable. Zero when
    /// nothing was applied.
    pub alloc_index: u64,
}

impl PlanResult {
    /// True when there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.node_evict.is_empty() && self.node_allocation.is_empty()
    }
}

/// Flat consensus payload for one committed plan.
///
/// Per-node grouping is the evaluator's concern; the log entry carries
/// plain concatenated lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocUpdateRequest {
    /// IDs of allocations to remove.
    pub evict: Vec<AllocationId>,
    /// Allocations to place.
    pub alloc: Vec<Allocation>,
}

impl AllocUpdateRequest {
    /// Flatten an accepted plan result, concatenating the per-node lists
    /// in sorted node order.
    pub fn from_result(result: &PlanResult) -> Self {
        let mut req = Self::default();

        let mut evict_nodes: Vec<&NodeId> = result.node_evict.keys().collect();
        evict_nodes.sort();
        for node_id in evict_nodes {
            req.evict.extend(result.node_evict[node_id].iter().cloned());
        }

        let mut alloc_nodes: Vec<&NodeId> = result.node_allocation.keys().collect();
        alloc_nodes.sort();
        for node_id in alloc_nodes {
            req.alloc
                .extend(result.node_allocation[node_id].iter().cloned());
        }

        req
    }
}
