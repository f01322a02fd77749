//! Domain types for the keel state store.
//!
//! These types represent the replicated cluster state the leader reads
//! when revalidating plans: nodes and the allocations assigned to them.
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Unique identifier for an allocation.
pub type AllocationId = String;

/// Identifier of the scheduler evaluation that produced a plan.
pub type EvalId = String;

/// Unique identifier for a job.
pub type JobId = String;

// ── Resources ─────────────────────────────────────────────────────

/// Resource vector shared by node capacity and allocation demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// CPU weight (relative, higher = more CPU time).
    pub cpu_weight: u32,
}

// ── Node ──────────────────────────────────────────────────────────

/// A schedulable node in the cluster.
///
/// `capacity` is the node's total resource vector. The set of allocations
/// currently assigned to a node is derived from the allocations table,
/// never stored on the node record itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub address: String,
    /// Total resource capacity of this node.
    pub capacity: Resources,
    /// Drained nodes accept no new placements.
    pub drained: bool,
    /// Arbitrary labels for scheduling affinity.
    pub labels: HashMap<String, String>,
    /// Unix timestamp of last heartbeat.
    pub last_heartbeat: u64,
}

// ── Allocation ────────────────────────────────────────────────────

/// A unit of work placed on exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub id: AllocationId,
    pub node_id: NodeId,
    pub job_id: JobId,
    /// Task group name within the job.
    pub name: String,
    /// Resource demand of this allocation.
    pub resources: Resources,
    /// Unix timestamp when this allocation was created.
    pub created_at: u64,
}

impl Allocation {
    /// Build the composite key for the allocations table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.node_id, self.id)
    }
}
