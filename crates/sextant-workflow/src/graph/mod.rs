//! Graph Execution Engine: stage-by-stage workflow orchestration.
//!
//! A workflow is a directed graph of named [`Node`]s over one shared
//! [`WorkflowState`]. Each node returns a partial update that is merged into
//! the state; edges are either unconditional or pick the next node through a
//! router function over the freshly updated state.
//!
//! [`StateGraph`] collects declarations and validates them in
//! [`StateGraph::compile`]. The resulting [`CompiledGraph`] runs strictly
//! sequentially from the entry node until [`END`], a node failure, or a
//! limit in [`RunLimits`].

pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use edge::{Edge, Router, END};
pub use executor::{CompiledGraph, RunLimits, RunOutcome, StageRecord, StateGraph};
pub use node::{FnNode, Node};
pub use state::WorkflowState;
