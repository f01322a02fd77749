//! StateStore — redb-backed cluster state for the keel leader.
//!
//! Provides typed operations over nodes and allocations, tracks the log
//! index at which each table was last modified, and hands out consistent
//! read snapshots. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::snapshot::StateSnapshot;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        txn.open_table(TABLE_INDEX).map_err(map_err!(Table))?;
        txn.open_table(RAFT_META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Take a consistent point-in-time snapshot of the store.
    ///
    /// The snapshot is unaffected by writes committed after this call.
    pub fn snapshot(&self) -> StateResult<StateSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        Ok(StateSnapshot::new(txn))
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node record at the given log index.
    pub fn put_node(&self, node: &Node, index: u64) -> StateResult<()> {
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        bump_index(&txn, NODES_INDEX, index)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %node.id, index, "node stored");
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node by ID at the given log index. Returns true if it existed.
    pub fn delete_node(&self, node_id: &str, index: u64) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(node_id).map_err(map_err!(Write))?.is_some();
        }
        bump_index(&txn, NODES_INDEX, index)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, existed, index, "node deleted");
        Ok(existed)
    }

    // ── Allocations ────────────────────────────────────────────────

    /// List all allocations assigned to a node.
    pub fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        let prefix = format!("{node_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
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

    /// List all allocations in the cluster.
    pub fn list_allocs(&self) -> StateResult<Vec<Allocation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let alloc: Allocation =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(alloc);
        }
        Ok(results)
    }

    /// Apply a committed alloc update in one atomic transaction.
    ///
    /// Evicted allocations are removed, new allocations inserted, and the
    /// allocations table's modify index advanced to `index`.
    pub fn apply_alloc_update(
        &self,
        evict: &[AllocationId],
        alloc: &[Allocation],
        index: u64,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;

            // Collect keys of evicted allocations first; keys embed the
            // owning node, so match on the stored record's ID.
            let mut doomed = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let existing: Allocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if evict.contains(&existing.id) {
                    doomed.push(key.value().to_string());
                }
            }
            for key in &doomed {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }

            for a in alloc {
                let value = serde_json::to_vec(a).map_err(map_err!(Serialize))?;
                table
                    .insert(a.table_key().as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        bump_index(&txn, ALLOCS_INDEX, index)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            evicted = evict.len(),
            placed = alloc.len(),
            index,
            "alloc update applied"
        );
        Ok(())
    }

    // ── Indices ────────────────────────────────────────────────────

    /// Log index at which the named table was last modified (0 if never).
    pub fn table_index(&self, table: &str) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index_table = txn.open_table(TABLE_INDEX).map_err(map_err!(Table))?;
        match index_table.get(table).map_err(map_err!(Read))? {
            Some(guard) => Ok(guard.value()),
            None => Ok(0),
        }
    }

    // ── Consensus metadata ─────────────────────────────────────────

    /// Read a consensus metadata entry by name.
    pub fn get_raft_meta(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RAFT_META).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    /// Write a consensus metadata entry.
    pub fn put_raft_meta(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RAFT_META).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Restore ────────────────────────────────────────────────────

    /// Replace the entire store contents (consensus snapshot install).
    pub fn restore(
        &self,
        nodes: &[Node],
        allocs: &[Allocation],
        indices: &[(String, u64)],
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut node_table = txn.open_table(NODES).map_err(map_err!(Table))?;
            clear_table(&mut node_table)?;
            for node in nodes {
                let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
                node_table
                    .insert(node.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut alloc_table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
            clear_table(&mut alloc_table)?;
            for alloc in allocs {
                let value = serde_json::to_vec(alloc).map_err(map_err!(Serialize))?;
                alloc_table
                    .insert(alloc.table_key().as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut index_table = txn.open_table(TABLE_INDEX).map_err(map_err!(Table))?;
            let stale: Vec<String> = index_table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            for key in &stale {
                index_table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for (table, index) in indices {
                index_table
                    .insert(table.as_str(), index)
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            nodes = nodes.len(),
            allocs = allocs.len(),
            "store restored from snapshot"
        );
        Ok(())
    }
}

/// Record `index` as the last-modified log index of `table`.
fn bump_index(txn: &WriteTransaction, table: &str, index: u64) -> StateResult<()> {
    let mut index_table = txn.open_table(TABLE_INDEX).map_err(map_err!(Table))?;
    index_table.insert(table, index).map_err(map_err!(Write))?;
    Ok(())
}

/// Remove every entry from a `&str`-keyed table.
fn clear_table(table: &mut redb::Table<'_, &str, &[u8]>) -> StateResult<()> {
    let keys: Vec<String> = table
        .iter()
        .map_err(map_err!(Read))?
        .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
        .collect();
    for key in &keys {
        table.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(())
}
