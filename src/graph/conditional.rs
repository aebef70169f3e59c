// SPDX-License-Identifier: MIT

//! Conditional routing node

use async_trait::async_trait;
use serde_json::json;

use crate::condition::{self, Expression};
use crate::error::LatticeError;
use crate::state::ExecutionState;

use super::node::{Node, NodeOutcome};

/// Evaluates a boolean expression over state and routes to one of two
/// designated nodes via the outcome's next-node override.
///
/// The expression is parsed at build time so malformed conditions are build
/// errors, not runtime surprises. Evaluation errors (unresolved keys, type
/// confusion) propagate as typed errors - never a silent false branch.
pub struct ConditionalNode {
    id: String,
    description: String,
    expression: Expression,
    true_target: String,
    false_target: String,
}

impl ConditionalNode {
    pub fn new(
        id: impl Into<String>,
        expression: Expression,
        true_target: impl Into<String>,
        false_target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            expression,
            true_target: true_target.into(),
            false_target: false_target.into(),
        }
    }

    /// Parse `expr` and build the node; malformed expressions fail here
    pub fn parse(
        id: impl Into<String>,
        expr: &str,
        true_target: impl Into<String>,
        false_target: impl Into<String>,
    ) -> Result<Self, LatticeError> {
        let expression = condition::parse(expr)?;
        Ok(Self::new(id, expression, true_target, false_target))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Node for ConditionalNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let verdict = condition::evaluate(&self.expression, state)?;
        let target = if verdict {
            &self.true_target
        } else {
            &self.false_target
        };

        log::debug!("node {}: condition {} -> {}", self.id, verdict, target);
        Ok(NodeOutcome::route_to(json!(verdict), target.clone()))
    }
}
