//! Thin adapter from the plan pipeline's consensus seam to openraft.

use std::sync::Arc;

use keel_plan::{AllocUpdateRequest, ConsensusApply, PlanError};
use tracing::debug;

use crate::typ::{KeelRaft, Request};

/// Submits alloc updates through a live Raft instance.
///
/// Construction of the Raft instance itself — log store, network
/// transport, membership — is the host process's concern; the handle
/// only owns the write path the plan applier uses.
#[derive(Clone)]
pub struct RaftHandle {
    raft: Arc<KeelRaft>,
}

impl RaftHandle {
    pub fn new(raft: Arc<KeelRaft>) -> Self {
        Self { raft }
    }
}

impl ConsensusApply for RaftHandle {
    async fn apply_alloc_update(&self, req: AllocUpdateRequest) -> Result<u64, PlanError> {
        let response = self
            .raft
            .client_write(Request::AllocUpdate(req))
            .await
            .map_err(|e| PlanError::ConsensusFailed(e.to_string()))?;

        let index = response.log_id.index;
        debug!(index, "alloc update committed");
        Ok(index)
    }
}
