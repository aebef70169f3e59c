// SPDX-License-Identifier: MIT

//! Execution state for graph workflows
//!
//! This module provides:
//! - `StateSchema` - defines the shape, reducers and defaults of workflow state
//! - `ExecutionState` - the versioned key/value store threaded through every
//!   node execution of a run

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::ExecutionState;
