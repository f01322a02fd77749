//! Plan evaluation against a consistent state snapshot.
//!
//! Decides which per-node portions of a plan still fit given the current
//! state. Pure with respect to its inputs: only reads the snapshot,
//! never writes. A plan that does not fit is not an error; it yields a
//! partial or empty result whose `refresh_index` names the state the
//! scheduler must observe before retrying.

use keel_state::{Allocation, Node, NodeId, StateSnapshot};
use tracing::debug;

use crate::error::PlanError;
use crate::types::{Plan, PlanResult};

/// Node-fit predicate consulted per node.
///
/// Must be pure: the whole proposed allocation set for the node is passed
/// in, and nothing else may influence the answer.
pub type FitFn = fn(&Node, &[Allocation]) -> bool;

/// Tables whose modify indices drive the refresh signal.
const NODES_TABLE: &str = "nodes";
const ALLOCS_TABLE: &str = "allocs";

/// Determine what portion of `plan` can be applied, if any.
///
/// Nodes are visited in sorted ID order. For each node the proposed set
/// is the existing allocations minus the plan's evictions for that node,
/// plus its new allocations; the fit predicate sees the full set.
///
/// Eviction and placement for a node are a packaged decision: when a
/// node fails to fit, its evictions are dropped along with its
/// placements. Nodes appearing only in `node_evict` are not visited.
pub fn evaluate_plan(
    snap: &StateSnapshot,
    plan: &Plan,
    fit: FitFn,
) -> Result<PlanResult, PlanError> {
    let mut result = PlanResult::default();

    // Deterministic node order; this also fixes the concatenation order
    // of the flat consensus payload built from the result.
    let mut entries: Vec<(&NodeId, &Vec<Allocation>)> = plan.node_allocation.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (node_id, alloc_list) in entries {
        let node = snap
            .node_by_id(node_id)
            .map_err(|e| PlanError::NodeLookupFailed {
                node_id: node_id.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| PlanError::NodeLookupFailed {
                node_id: node_id.clone(),
                reason: "node not found in snapshot".to_string(),
            })?;

        let existing = snap
            .allocs_by_node(node_id)
            .map_err(|e| PlanError::AllocLookupFailed {
                node_id: node_id.clone(),
                reason: e.to_string(),
            })?;

        // Proposed set: existing minus planned evictions, then the new
        // allocations appended.
        let evictions = plan
            .node_evict
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut proposed = existing;
        if !evictions.is_empty() {
            proposed.retain(|alloc| !evictions.contains(&alloc.id));
        }
        proposed.extend(alloc_list.iter().cloned());

        if !fit(&node, &proposed) {
            // The scheduler planned against stale data. The refresh
            // index forces it to observe the latest nodes and
            // allocations before retrying.
            let node_index = table_index(snap, NODES_TABLE)?;
            let alloc_index = table_index(snap, ALLOCS_TABLE)?;
            result.refresh_index = result.refresh_index.max(node_index).max(alloc_index);

            // An all-at-once plan has already failed; the submitter must
            // see nothing accepted.
            if plan.all_at_once {
                result.node_evict.clear();
                result.node_allocation.clear();
                return Ok(result);
            }

            debug!(%node_id, "node does not fit, skipping");
            continue;
        }

        if !evictions.is_empty() {
            result
                .node_evict
                .insert(node_id.clone(), evictions.to_vec());
        }
        if !alloc_list.is_empty() {
            result
                .node_allocation
                .insert(node_id.clone(), alloc_list.clone());
        }
    }

    Ok(result)
}

fn table_index(snap: &StateSnapshot, table: &str) -> Result<u64, PlanError> {
    snap.table_index(table)
        .map_err(|e| PlanError::IndexLookupFailed {
            table: table.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_placement::allocations_fit;
    use keel_state::{Resources, StateStore};
    use std::collections::HashMap;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn make_node(id: &str, memory: u64) -> Node {
        Node {
            id: id.to_string(),
            address: "10.0.0.1".to_string(),
            capacity: Resources {
                memory_bytes: memory,
                cpu_weight: 1000,
            },
            drained: false,
            labels: HashMap::new(),
            last_heartbeat: 1000,
        }
    }

    fn make_alloc(id: &str, node: &str, memory: u64) -> Allocation {
        Allocation {
            id: id.to_string(),
            node_id: node.to_string(),
            job_id: "job-1".to_string(),
            name: "web".to_string(),
            resources: Resources {
                memory_bytes: memory,
                cpu_weight: 1,
            },
            created_at: 1000,
        }
    }

    fn place(plan: &mut Plan, node: &str, allocs: Vec<Allocation>) {
        plan.node_allocation.insert(node.to_string(), allocs);
    }

    fn evict(plan: &mut Plan, node: &str, ids: &[&str]) {
        plan.node_evict
            .insert(node.to_string(), ids.iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn fully_fitting_plan_is_preserved_whole() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();

        let mut plan = Plan::default();
        place(
            &mut plan,
            "a",
            vec![make_alloc("a1", "a", 4), make_alloc("a2", "a", 4)],
        );

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert_eq!(result.node_allocation, plan.node_allocation);
        assert_eq!(result.node_evict, plan.node_evict);
        assert_eq!(result.refresh_index, 0);
        assert_eq!(result.alloc_index, 0);
    }

    #[test]
    fn unfit_node_is_skipped_and_refresh_set() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();
        store.put_node(&make_node("b", 5), 1).unwrap();
        store
            .apply_alloc_update(&[], &[make_alloc("b1", "b", 3)], 2)
            .unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "a", vec![make_alloc("a1", "a", 4)]);
        place(
            &mut plan,
            "b",
            vec![make_alloc("b2", "b", 3), make_alloc("b3", "b", 3)],
        );

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert_eq!(result.node_allocation.len(), 1);
        assert_eq!(result.node_allocation["a"][0].id, "a1");
        assert!(result.node_evict.is_empty());
        // max(nodes index 1, allocs index 2)
        assert_eq!(result.refresh_index, 2);
    }

    #[test]
    fn all_at_once_discards_partial_acceptance() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();
        store.put_node(&make_node("b", 5), 1).unwrap();
        store
            .apply_alloc_update(&[], &[make_alloc("b1", "b", 3)], 2)
            .unwrap();

        let mut plan = Plan {
            all_at_once: true,
            ..Plan::default()
        };
        place(&mut plan, "a", vec![make_alloc("a1", "a", 4)]);
        place(
            &mut plan,
            "b",
            vec![make_alloc("b2", "b", 3), make_alloc("b3", "b", 3)],
        );

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert!(result.node_allocation.is_empty());
        assert!(result.node_evict.is_empty());
        assert_eq!(result.refresh_index, 2);
    }

    #[test]
    fn eviction_makes_room_for_placement() {
        let store = test_store();
        store.put_node(&make_node("b", 5), 1).unwrap();
        store
            .apply_alloc_update(
                &[],
                &[make_alloc("b1", "b", 3), make_alloc("b2", "b", 3)],
                2,
            )
            .unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "b", vec![make_alloc("b3", "b", 2)]);
        evict(&mut plan, "b", &["b1"]);

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert_eq!(result.node_evict["b"], vec!["b1".to_string()]);
        assert_eq!(result.node_allocation["b"][0].id, "b3");
        assert_eq!(result.refresh_index, 0);
    }

    #[test]
    fn missing_node_aborts_evaluation() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "a", vec![make_alloc("a1", "a", 4)]);
        place(&mut plan, "ghost", vec![make_alloc("g1", "ghost", 1)]);

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit);

        assert!(matches!(
            result,
            Err(PlanError::NodeLookupFailed { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn empty_alloc_list_contributes_nothing() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "a", Vec::new());

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert!(result.is_empty());
        assert_eq!(result.refresh_index, 0);
    }

    #[test]
    fn pure_eviction_nodes_are_not_visited() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();
        store
            .apply_alloc_update(&[], &[make_alloc("a1", "a", 4)], 2)
            .unwrap();

        // Node "a" appears only in node_evict; the evaluator iterates
        // node_allocation, so the eviction is silently dropped.
        let mut plan = Plan::default();
        evict(&mut plan, "a", &["a1"]);

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn eviction_with_empty_placement_list_is_kept() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();
        store
            .apply_alloc_update(&[], &[make_alloc("a1", "a", 4)], 2)
            .unwrap();

        // An empty placement entry makes the node visible to the
        // evaluator, so its coupled eviction is carried through.
        let mut plan = Plan::default();
        place(&mut plan, "a", Vec::new());
        evict(&mut plan, "a", &["a1"]);

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert_eq!(result.node_evict["a"], vec!["a1".to_string()]);
        assert!(result.node_allocation.is_empty());
    }

    #[test]
    fn refresh_index_is_max_of_table_indices() {
        let store = test_store();
        store.put_node(&make_node("a", 1), 7).unwrap();
        store.put_node(&make_node("b", 1), 7).unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "a", vec![make_alloc("a1", "a", 5)]);
        place(&mut plan, "b", vec![make_alloc("b1", "b", 5)]);

        let snap = store.snapshot().unwrap();
        let result = evaluate_plan(&snap, &plan, allocations_fit).unwrap();

        assert!(result.is_empty());
        // nodes index 7, allocs index 0.
        assert_eq!(result.refresh_index, 7);
    }

    #[test]
    fn refresh_index_is_monotone_over_advancing_state() {
        let store = test_store();
        store.put_node(&make_node("b", 5), 1).unwrap();
        store
            .apply_alloc_update(&[], &[make_alloc("b1", "b", 3)], 2)
            .unwrap();

        let mut plan = Plan::default();
        place(
            &mut plan,
            "b",
            vec![make_alloc("b2", "b", 3), make_alloc("b3", "b", 3)],
        );

        let snap1 = store.snapshot().unwrap();
        let first = evaluate_plan(&snap1, &plan, allocations_fit).unwrap();

        // State advances between evaluations.
        store
            .apply_alloc_update(&[], &[make_alloc("c1", "other", 1)], 9)
            .unwrap();

        let snap2 = store.snapshot().unwrap();
        let second = evaluate_plan(&snap2, &plan, allocations_fit).unwrap();

        assert!(second.refresh_index >= first.refresh_index);
        assert_eq!(first.refresh_index, 2);
        assert_eq!(second.refresh_index, 9);
    }

    #[test]
    fn fit_predicate_is_injectable() {
        let store = test_store();
        store.put_node(&make_node("a", 10), 1).unwrap();

        let mut plan = Plan::default();
        place(&mut plan, "a", vec![make_alloc("a1", "a", 4)]);

        let snap = store.snapshot().unwrap();

        // A predicate that rejects everything produces an empty result.
        let reject_all: FitFn = |_, _| false;
        let result = evaluate_plan(&snap, &plan, reject_all).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.refresh_index, 1);

        // A predicate that accepts everything preserves the plan.
        let accept_all: FitFn = |_, _| true;
        let result = evaluate_plan(&snap, &plan, accept_all).unwrap();
        assert_eq!(result.node_allocation, plan.node_allocation);
    }
}
