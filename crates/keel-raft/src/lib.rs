//! keel-raft — consensus wiring for the keel leader.
//!
//! The plan applier commits accepted plan portions as single replicated
//! log entries. This crate provides the pieces that bind that commit
//! path to openraft:
//!
//! - **`typ`** — Type configuration (`TypeConfig`, `Request`, `Response`)
//! - **`state_machine`** — Applies committed alloc-update entries to the
//!   keel state store, advancing its per-table modify indices
//! - **`handle`** — `RaftHandle`, the [`keel_plan::ConsensusApply`]
//!   implementation over a live Raft instance
//!
//! Log storage, the network transport, and cluster membership are the
//! host process's concern; this crate only covers the write path the
//! plan pipeline consumes.

pub mod handle;
pub mod state_machine;
pub mod typ;

pub use handle::RaftHandle;
pub use state_machine::StateMachine;
pub use typ::{KeelRaft, Request, Response, TypeConfig};
