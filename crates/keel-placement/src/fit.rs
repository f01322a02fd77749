//! Aggregate bin-packing fit check for a single node.

use keel_state::{Allocation, Node, Resources};

/// Sum the resource demand of a set of allocations.
///
/// Duplicate allocations are not de-duplicated; each entry counts. The
/// caller is expected to pass the full proposed set for one node.
pub fn total_demand(allocs: &[Allocation]) -> Resources {
    let mut total = Resources::default();
    for alloc in allocs {
        total.memory_bytes = total.memory_bytes.saturating_add(alloc.resources.memory_bytes);
        total.cpu_weight = total.cpu_weight.saturating_add(alloc.resources.cpu_weight);
    }
    total
}

/// Check whether `proposed` fits within `node`'s total capacity.
///
/// Drained nodes never fit. Otherwise the check is a plain aggregate
/// comparison on each resource dimension.
pub fn allocations_fit(node: &Node, proposed: &[Allocation]) -> bool {
    if node.drained {
        return false;
    }

    let demand = total_demand(proposed);
    demand.memory_bytes <= node.capacity.memory_bytes
        && demand.cpu_weight <= node.capacity.cpu_weight
}
