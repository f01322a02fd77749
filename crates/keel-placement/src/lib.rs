//! keel-placement — node-fit checks for plan revalidation.
//!
//! The only placement intelligence the plan applier consults: given a
//! node and the full set of allocations proposed for it, decide whether
//! the aggregate resource demand fits within the node's capacity.
//!
//! Everything here is a pure function of its arguments. Keeping global
//! state out of the fit decision is what makes the plan evaluator
//! testable in isolation.

pub mod fit;

pub use fit::{allocations_fit, total_demand};
