// SPDX-License-Identifier: MIT

//! Multi-agent coordination
//!
//! Runs several independent executors concurrently, each with isolated state.
//! The coordinator matches tasks to agents, caps concurrency, tracks agent
//! health, and folds the results into one aggregated answer.

mod agent;
mod dispatch;
mod shared;

pub use agent::{GraphAgent, TaskRunner, WorkflowTask};
pub use dispatch::{
    Coordinator, CoordinatorConfig, DispatchStrategy, HealthState, TaskReport, WorkflowOutcome,
};
pub use shared::{SharedState, WritePolicy};
