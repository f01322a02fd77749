//! redb table definitions for the keel state store.
//!
//! Node and allocation tables use `&str` keys and `&[u8]` values
//! (JSON-serialized domain types). The index table maps a table name to
//! the log index at which that table was last modified.

use redb::TableDefinition;

/// Node records keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Allocations keyed by `{node_id}:{allocation_id}`.
pub const ALLOCS: TableDefinition<&str, &[u8]> = TableDefinition::new("allocs");

/// Last-modified log index per table, keyed by table name.
pub const TABLE_INDEX: TableDefinition<&str, u64> = TableDefinition::new("table_index");

/// Consensus metadata (last applied entry, membership), keyed by name.
pub const RAFT_META: TableDefinition<&str, &[u8]> = TableDefinition::new("raft_meta");

/// Name under which the nodes table's modify index is tracked.
pub const NODES_INDEX: &str = "nodes";

/// Name under which the allocations table's modify index is tracked.
pub const ALLOCS_INDEX: &str = "allocs";
