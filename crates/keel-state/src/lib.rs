//! keel-state — embedded cluster state store for the keel leader.
//!
//! Backed by [redb](https://docs.rs/redb), holds the replicated view of
//! nodes and allocations that the plan applier revalidates plans against.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Allocations use composite keys (`{node_id}:{allocation_id}`) so the
//! per-node allocation set can be read with a prefix scan.
//!
//! Every mutation carries the log index it was committed at; the store
//! records, per table, the highest index that modified it. Readers use
//! these indices to detect staleness.
//!
//! `StateStore::snapshot()` returns a [`StateSnapshot`] — a redb read
//! transaction, i.e. a true point-in-time consistent view that is
//! unaffected by later writes.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod snapshot;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use snapshot::StateSnapshot;
pub use store::StateStore;
pub use types::*;
