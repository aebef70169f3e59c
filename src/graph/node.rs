// SPDX-License-Identifier: MIT

//! Node abstraction and the basic node kinds
//!
//! Every unit of work in a graph implements [`Node`]: immutable identity plus
//! an `execute` that reads and mutates the run's [`ExecutionState`]. Nodes are
//! built once and never mutated after the graph is sealed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::capability::Capability;
use crate::error::LatticeError;
use crate::retry::RetryPolicy;
use crate::state::ExecutionState;

/// What a node produced, plus optional routing directives.
///
/// `next` overrides normal edge resolution; conditional and loop nodes use it
/// to name their successor directly.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// The node's return value (also written into state by most node kinds)
    pub value: Value,
    /// Explicit next-node override, bypassing edge resolution
    pub next: Option<String>,
    /// Ask the executor to checkpoint at this node boundary
    pub checkpoint_requested: bool,
}

impl NodeOutcome {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            next: None,
            checkpoint_requested: false,
        }
    }

    pub fn route_to(value: Value, next: impl Into<String>) -> Self {
        Self {
            value,
            next: Some(next.into()),
            checkpoint_requested: false,
        }
    }

    pub fn with_checkpoint(mut self) -> Self {
        self.checkpoint_requested = true;
        self
    }
}

/// A unit of work in the execution graph
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique id within the graph
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str {
        self.id()
    }

    fn description(&self) -> &str {
        ""
    }

    /// Execute against the run's state. May mutate state; returns the outcome
    /// or a node-level error, which the executor records and classifies.
    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError>;
}

/// Node that invokes an external capability and stores its output in state.
///
/// Parameters are a JSON template; string values of the form `$state.key`
/// (dot paths allowed) are replaced with the current state value, missing
/// references become null. The capability's own error surfaces unchanged -
/// wrap the node in [`RetryingNode`] for retries.
pub struct FunctionNode {
    id: String,
    name: String,
    description: String,
    capability: Arc<dyn Capability>,
    params: Value,
    output_key: String,
}

impl FunctionNode {
    pub fn new(
        id: impl Into<String>,
        capability: Arc<dyn Capability>,
        output_key: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            description: String::new(),
            id,
            capability,
            params: Value::Object(Map::new()),
            output_key: output_key.into(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Replace `$state.path` string values in a parameter template with values
/// from the current state
pub(crate) fn resolve_params(template: &Value, state: &ExecutionState) -> Value {
    match template {
        Value::String(s) => {
            if let Some(path) = s.strip_prefix("$state.") {
                state.get_path(path).cloned().unwrap_or(Value::Null)
            } else {
                template.clone()
            }
        }
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), resolve_params(v, state)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve_params(v, state)).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl Node for FunctionNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let params = resolve_params(&self.params, state);
        log::debug!(
            "node {}: invoking capability '{}'",
            self.id,
            self.capability.name()
        );

        let result = self.capability.invoke(params).await?;
        state.set(&self.output_key, result.clone());

        Ok(NodeOutcome::value(result))
    }
}

/// Decorator adding a retry policy to any node.
///
/// Only retryable errors (external capability failures) are retried; build
/// defects and routing outcomes pass straight through.
pub struct RetryingNode {
    inner: Arc<dyn Node>,
    policy: RetryPolicy,
}

impl RetryingNode {
    pub fn new(inner: Arc<dyn Node>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Node for RetryingNode {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let mut attempts: u32 = 0;

        loop {
            match self.inner.execute(state).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    attempts += 1;
                    if e.is_retryable() && self.policy.should_retry(attempts) {
                        let delay = self.policy.calculate_delay(attempts - 1);
                        log::warn!(
                            "node {} attempt {} failed, retrying in {:?}: {}",
                            self.inner.id(),
                            attempts,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}
