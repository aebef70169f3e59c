// SPDX-License-Identifier: MIT

//! Bounded iteration for While/ReAct-style loops
//!
//! The controller owns the evaluate/execute/increment/recheck cycle. The
//! iteration ceiling is mandatory and always enforced - a condition that
//! never goes false still terminates after `max_iterations` passes.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::condition::{self, Expression};
use crate::error::LatticeError;
use crate::state::ExecutionState;

use super::node::{Node, NodeOutcome};

/// Runs a body node while a condition holds, up to a hard iteration cap.
///
/// Each pass publishes `<loop_id>.iteration` and `<loop_id>.max_iterations`
/// into state so the body can observe where it is; `<loop_id>.iterations_used`
/// is written on exit.
pub struct LoopController {
    condition: Expression,
    max_iterations: u32,
}

impl LoopController {
    pub fn new(condition: Expression, max_iterations: u32) -> Self {
        Self {
            condition,
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the cycle; returns the number of body executions performed
    pub async fn run(
        &self,
        loop_id: &str,
        body: &dyn Node,
        state: &mut ExecutionState,
    ) -> Result<u32, LatticeError> {
        let iteration_key = format!("{}.iteration", loop_id);
        state.set(
            &format!("{}.max_iterations", loop_id),
            json!(self.max_iterations),
        );

        let mut used: u32 = 0;
        loop {
            state.set(&iteration_key, json!(used));

            if used >= self.max_iterations {
                log::warn!(
                    "loop {}: iteration cap {} reached, forcing exit",
                    loop_id,
                    self.max_iterations
                );
                break;
            }
            if !condition::evaluate(&self.condition, state)? {
                break;
            }

            body.execute(state).await?;
            used += 1;
        }

        state.set(&format!("{}.iterations_used", loop_id), json!(used));
        Ok(used)
    }
}

/// Node wrapper around [`LoopController`] with a configured successor
pub struct LoopNode {
    id: String,
    description: String,
    controller: LoopController,
    body: Arc<dyn Node>,
    exit_to: Option<String>,
}

impl LoopNode {
    pub fn new(
        id: impl Into<String>,
        condition: Expression,
        max_iterations: u32,
        body: Arc<dyn Node>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            controller: LoopController::new(condition, max_iterations),
            body,
            exit_to: None,
        }
    }

    /// Parse the condition text and build the node
    pub fn parse(
        id: impl Into<String>,
        expr: &str,
        max_iterations: u32,
        body: Arc<dyn Node>,
    ) -> Result<Self, LatticeError> {
        let condition = condition::parse(expr)?;
        Ok(Self::new(id, condition, max_iterations, body))
    }

    /// Route to `target` after the loop exits instead of normal edge resolution
    pub fn with_exit_to(mut self, target: impl Into<String>) -> Self {
        self.exit_to = Some(target.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Node for LoopNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let used = self
            .controller
            .run(&self.id, self.body.as_ref(), state)
            .await?;

        let value = json!({ "iterations": used });
        Ok(match &self.exit_to {
            Some(target) => NodeOutcome::route_to(value, target.clone()),
            None => NodeOutcome::value(value),
        })
    }
}
