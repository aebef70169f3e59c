// SPDX-License-Identifier: MIT

//! lattice-rs: graph-based workflow execution for multi-step agent pipelines
//!
//! A workflow is a directed graph of nodes (capability calls, conditionals,
//! loops, aggregators) joined by conditioned edges. The executor walks it
//! sequentially over a JSON state container, records the path, and can
//! checkpoint at node boundaries for later resumption. A coordinator runs
//! several executors concurrently and folds their results together.

pub mod builder;
pub mod capability;
pub mod checkpoint;
pub mod condition;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod graph;
pub mod retry;
pub mod state;

pub use builder::GraphBuilder;
pub use capability::{Capability, CapabilityRegistry};
pub use definition::GraphDefinition;
pub use error::{CheckpointError, EvalError, GraphBuildError, LatticeError, StateError};
pub use graph::{
    ExecutionOptions, ExecutionReport, ExecutionStatus, GraphExecutor, Node, NodeOutcome,
};
pub use state::ExecutionState;
