//! Bounded multi-step workflow orchestration over typed node graphs.
//!
//! A workflow is a directed graph of nodes identified by a caller-defined
//! key type (typically a small enum). Each node owns a handler that takes
//! the shared state by value and returns the full replacement state.
//! Transitions are either direct edges or routers: pure functions that
//! inspect the new state and pick the next node from a declared target set.
//!
//! Graphs are built once with [`GraphBuilder`], validated by
//! [`GraphBuilder::compile`], and never mutated afterwards. [`Graph::run`]
//! walks the graph from the entry node under a step budget; exhausting the
//! budget is a fatal error, never a silent stop.

pub mod builder;
pub mod executor;

pub use builder::{node_fn, GraphBuilder, NodeHandler, NodeKey};
pub use executor::{Finished, Graph};
