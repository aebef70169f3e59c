// SPDX-License-Identifier: MIT

//! Graph construction and execution
//!
//! A graph is a set of nodes (units of work) joined by directed, optionally
//! conditioned edges. The executor walks it sequentially: run node, route,
//! advance, until a terminal node, a failure, or an exhausted budget.

pub mod action;
pub mod aggregate;
pub mod conditional;
pub mod edge;
pub mod executor;
pub mod loops;
pub mod node;
pub mod validate;

pub use action::ActionNode;
pub use aggregate::{AggregationInput, AggregationStrategy, AggregatorNode, ConflictPolicy};
pub use conditional::ConditionalNode;
pub use edge::{Edge, RoutingPolicy};
pub use executor::{
    CancellationToken, CheckpointMode, ExecutionOptions, ExecutionReport, ExecutionStatus,
    GraphExecutor,
};
pub use loops::{LoopController, LoopNode};
pub use node::{FunctionNode, Node, NodeOutcome, RetryingNode};
