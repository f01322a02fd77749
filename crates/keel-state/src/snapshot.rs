//! Consistent read snapshots over the state store.
//!
//! A snapshot wraps a redb read transaction, which pins the database at
//! the moment it was created: writes committed afterwards are invisible.
//! The plan evaluator reads exclusively through this surface so that one
//! evaluation sees exactly one version of the world.

use redb::{ReadTransaction, ReadableTable};

use crate::error::{StateError, StateResult};
use crate::tables::{ALLOCS, NODES, TABLE_INDEX};
use crate::types::{Allocation, Node};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A point-in-time consistent view of nodes, allocations, and indices.
pub struct StateSnapshot {
    txn: ReadTransaction,
}

impl StateSnapshot {
    pub(crate) fn new(txn: ReadTransaction) -> Self {
        Self { txn }
    }

    /// Get a node by ID as of this snapshot.
    pub fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>> {
        let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List the allocations assigned to a node as of this snapshot.
    pub fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        let prefix = format!("{node_id}:");
        let table = self.txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let alloc: Allocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(alloc);
            }
        }
        Ok(results)
    }

    /// List every node as of this snapshot.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    /// List every allocation as of this snapshot.
    pub fn list_allocs(&self) -> StateResult<Vec<Allocation>> {
        let table = self.txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let alloc: Allocation =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(alloc);
        }
        Ok(results)
    }

    /// Log index at which the named table was last modified (0 if never).
    pub fn table_index(&self, table: &str) -> StateResult<u64> {
        let index_table = self.txn.open_table(TABLE_INDEX).map_err(map_err!(Table))?;
        match index_table.get(table).map_err(map_err!(Read))? {
            Some(guard) => Ok(guard.value()),
            None => Ok(0),
        }
    }
}
