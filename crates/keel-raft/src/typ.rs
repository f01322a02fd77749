//! Raft type configuration for keel.
//!
//! Defines the `TypeConfig` that wires together all openraft associated
//! types: node IDs, the alloc-update request/response payloads, and the
//! async runtime.

use std::io::Cursor;

use openraft::TokioRuntime;

use keel_plan::AllocUpdateRequest;

/// Client write request submitted to the Raft cluster.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Request {
    /// Commit the accepted portion of a plan: evictions plus placements.
    AllocUpdate(AllocUpdateRequest),
}

/// Response returned after a write is applied to the state machine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub success: bool,
}

openraft::declare_raft_types!(
    /// Keel Raft type configuration.
    pub TypeConfig:
        D = Request,
        R = Response,
        NodeId = u64,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

/// Convenience alias for the Raft instance.
pub type KeelRaft = openraft::Raft<TypeConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roundtrip() {
        let req = Request::AllocUpdate(AllocUpdateRequest {
            evict: vec!["old-alloc".to_string()],
            alloc: Vec::new(),
        });
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        let Request::AllocUpdate(update) = back;
        assert_eq!(update.evict, vec!["old-alloc".to_string()]);
        assert!(update.alloc.is_empty());
    }

    #[test]
    fn response_serializes_roundtrip() {
        let resp = Response { success: true };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert!(back.success);
    }
}
