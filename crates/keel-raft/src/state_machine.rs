//! Raft state machine backed by the keel state store.
//!
//! Applies committed alloc-update entries: evicted allocations are
//! removed, new allocations inserted, and the allocations table's modify
//! index advanced to the entry's log index — the index plan submitters
//! later see as `alloc_index` and compare against `refresh_index`.
//! Supports snapshots for log compaction.

use std::io::Cursor;

use keel_state::tables::{ALLOCS_INDEX, NODES_INDEX};
use keel_state::{Allocation, Node, StateStore};
use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, Snapshot, SnapshotMeta, StorageError,
    StoredMembership,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::typ::{Request, Response, TypeConfig};

const APPLIED_KEY: &str = "last_applied";
const MEMBERSHIP_KEY: &str = "membership";

fn read_err(e: impl std::fmt::Display) -> StorageError<u64> {
    StorageError::from_io_error(
        ErrorSubject::Store,
        ErrorVerb::Read,
        std::io::Error::other(e.to_string()),
    )
}

fn write_err(e: impl std::fmt::Display) -> StorageError<u64> {
    StorageError::from_io_error(
        ErrorSubject::Store,
        ErrorVerb::Write,
        std::io::Error::other(e.to_string()),
    )
}

/// Serialized form of the whole state machine, shipped to followers.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotContents {
    nodes: Vec<Node>,
    allocs: Vec<Allocation>,
    indices: Vec<(String, u64)>,
}

/// Raft state machine over the keel state store.
pub struct StateMachine {
    store: StateStore,
}

/// Snapshot builder that reads current state machine contents.
pub struct SmSnapshotBuilder {
    store: StateStore,
}

impl StateMachine {
    /// Create a state machine sharing the given state store.
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    fn apply_request(&self, req: &Request, index: u64) -> Result<(), StorageError<u64>> {
        match req {
            Request::AllocUpdate(update) => self
                .store
                .apply_alloc_update(&update.evict, &update.alloc, index)
                .map_err(write_err)?,
        }
        debug!(index, "applied alloc update to state machine");
        Ok(())
    }

    fn save_meta(&self, key: &str, data: &[u8]) -> Result<(), StorageError<u64>> {
        self.store.put_raft_meta(key, data).map_err(write_err)
    }
}

fn get_applied(store: &StateStore) -> Result<Option<LogId<u64>>, StorageError<u64>> {
    match store.get_raft_meta(APPLIED_KEY).map_err(read_err)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw).map_err(read_err)?)),
        None => Ok(None),
    }
}

fn get_membership(
    store: &StateStore,
) -> Result<StoredMembership<u64, openraft::BasicNode>, StorageError<u64>> {
    match store.get_raft_meta(MEMBERSHIP_KEY).map_err(read_err)? {
        Some(raw) => Ok(serde_json::from_slice(&raw).map_err(read_err)?),
        None => Ok(StoredMembership::default()),
    }
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = SmSnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<
        (
            Option<LogId<u64>>,
            StoredMembership<u64, openraft::BasicNode>,
        ),
        StorageError<u64>,
    > {
        let applied = get_applied(&self.store)?;
        let membership = get_membership(&self.store)?;
        Ok((applied, membership))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<Response>, StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        let mut responses = Vec::new();

        for entry in entries {
            let log_id = entry.log_id;

            match entry.payload {
                EntryPayload::Blank => {
                    responses.push(Response { success: true });
                }
                EntryPayload::Normal(req) => {
                    self.apply_request(&req, log_id.index)?;
                    responses.push(Response { success: true });
                }
                EntryPayload::Membership(membership) => {
                    let stored = StoredMembership::new(Some(log_id), membership);
                    let data = serde_json::to_vec(&stored).map_err(write_err)?;
                    self.save_meta(MEMBERSHIP_KEY, &data)?;
                    responses.push(Response { success: true });
                }
            }

            // Update last applied.
            let data = serde_json::to_vec(&log_id).map_err(write_err)?;
            self.save_meta(APPLIED_KEY, &data)?;
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        SmSnapshotBuilder {
            store: self.store.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<u64, openraft::BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let data = snapshot.into_inner();
        let contents: SnapshotContents =
            serde_json::from_slice(&data).map_err(read_err)?;

        self.store
            .restore(&contents.nodes, &contents.allocs, &contents.indices)
            .map_err(write_err)?;

        let applied_data = serde_json::to_vec(&meta.last_log_id).map_err(write_err)?;
        self.save_meta(APPLIED_KEY, &applied_data)?;

        let membership_data = serde_json::to_vec(&meta.last_membership).map_err(write_err)?;
        self.save_meta(MEMBERSHIP_KEY, &membership_data)?;

        info!("installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<u64>> {
        let applied = get_applied(&self.store)?;
        if applied.is_none() {
            return Ok(None);
        }

        let mut builder = SmSnapshotBuilder {
            store: self.store.clone(),
        };
        let snapshot = builder.build_snapshot().await?;
        Ok(Some(snapshot))
    }
}

impl RaftSnapshotBuilder<TypeConfig> for SmSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<u64>> {
        // One store snapshot keeps nodes, allocs, and indices consistent.
        let view = self.store.snapshot().map_err(read_err)?;
        let contents = SnapshotContents {
            nodes: view.list_nodes().map_err(read_err)?,
            allocs: view.list_allocs().map_err(read_err)?,
            indices: vec![
                (
                    NODES_INDEX.to_string(),
                    view.table_index(NODES_INDEX).map_err(read_err)?,
                ),
                (
                    ALLOCS_INDEX.to_string(),
                    view.table_index(ALLOCS_INDEX).map_err(read_err)?,
                ),
            ],
        };
        let data = serde_json::to_vec(&contents).map_err(read_err)?;

        let last_applied = get_applied(&self.store)?;
        let membership = get_membership(&self.store)?;

        let snapshot_id = format!("snap-{}", last_applied.map_or(0, |l| l.index));

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership: membership,
            snapshot_id,
        };

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}
