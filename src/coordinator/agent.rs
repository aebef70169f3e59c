// SPDX-License-Identifier: MIT

//! Agents: schedulable task runners wrapping an executor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::LatticeError;
use crate::graph::{ExecutionOptions, GraphExecutor};
use crate::state::ExecutionState;

/// A unit of coordinated work, consumed exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub task_id: String,
    /// Capabilities an agent must carry to take this task
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Higher runs earlier under priority-weighted dispatch
    #[serde(default)]
    pub priority: i32,
    /// Seed values merged into the run's initial state
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub estimated_duration_ms: Option<u64>,
}

impl WorkflowTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            required_capabilities: Vec::new(),
            priority: 0,
            parameters: Value::Null,
            estimated_duration_ms: None,
        }
    }

    pub fn requiring(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// An independently schedulable worker the coordinator can hand tasks to.
///
/// `ping` is a lightweight liveness probe; it must not run real work.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Unique id within the coordinator
    fn id(&self) -> &str;

    /// Capability names this runner can satisfy
    fn capabilities(&self) -> &[String];

    async fn run(&self, task: &WorkflowTask, state: ExecutionState) -> Result<Value, LatticeError>;

    fn ping(&self) -> bool {
        true
    }
}

/// A [`TaskRunner`] that executes a graph per task.
///
/// Task parameters (a JSON object) become initial state keys; the result is
/// the configured output key from final state, or the whole state when none
/// is set.
pub struct GraphAgent {
    id: String,
    capabilities: Vec<String>,
    executor: Arc<GraphExecutor>,
    output_key: Option<String>,
}

impl GraphAgent {
    pub fn new(
        id: impl Into<String>,
        capabilities: Vec<String>,
        executor: Arc<GraphExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            capabilities,
            executor,
            output_key: None,
        }
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }
}

#[async_trait]
impl TaskRunner for GraphAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn run(
        &self,
        task: &WorkflowTask,
        mut state: ExecutionState,
    ) -> Result<Value, LatticeError> {
        if let Value::Object(params) = &task.parameters {
            for (key, value) in params {
                state.set(key, value.clone());
            }
        }
        state.set("task_id", Value::String(task.task_id.clone()));

        let report = self
            .executor
            .execute(state, ExecutionOptions::default())
            .await?;

        if let Some(error) = report.error {
            return Err(error);
        }
        if !report.is_complete() {
            return Err(LatticeError::other(format!(
                "task '{}' did not run to completion on agent '{}'",
                task.task_id, self.id
            )));
        }

        Ok(match &self.output_key {
            Some(key) => report.state.get(key).cloned().unwrap_or(Value::Null),
            None => report.state.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeOutcome};
    use serde_json::json;

    struct DoubleNode;

    #[async_trait]
    impl Node for DoubleNode {
        fn id(&self) -> &str {
            "double"
        }

        async fn execute(
            &self,
            state: &mut ExecutionState,
        ) -> Result<NodeOutcome, LatticeError> {
            let n: i64 = state.try_get_as("input").unwrap_or(0);
            state.set("result", json!(n * 2));
            Ok(NodeOutcome::value(json!(n * 2)))
        }
    }

    fn graph_agent() -> GraphAgent {
        let mut graph = GraphExecutor::new("doubler");
        graph.add_node(Arc::new(DoubleNode)).unwrap();
        graph.mark_terminal("double").unwrap();
        GraphAgent::new("agent-1", vec!["math".to_string()], Arc::new(graph))
            .with_output_key("result")
    }

    #[tokio::test]
    async fn test_graph_agent_seeds_parameters_and_extracts_output() {
        let agent = graph_agent();
        let task = WorkflowTask::new("t1").with_parameters(json!({"input": 21}));

        let result = agent.run(&task, ExecutionState::empty()).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn test_graph_agent_without_output_key_returns_full_state() {
        let mut graph = GraphExecutor::new("doubler");
        graph.add_node(Arc::new(DoubleNode)).unwrap();
        graph.mark_terminal("double").unwrap();
        let agent = GraphAgent::new("agent-2", vec![], Arc::new(graph));

        let task = WorkflowTask::new("t2").with_parameters(json!({"input": 5}));
        let result = agent.run(&task, ExecutionState::empty()).await.unwrap();

        assert_eq!(result["result"], json!(10));
        assert_eq!(result["task_id"], json!("t2"));
    }

    #[test]
    fn test_task_builder() {
        let task = WorkflowTask::new("t")
            .requiring("search")
            .requiring("math")
            .with_priority(5);
        assert_eq!(task.required_capabilities, vec!["search", "math"]);
        assert_eq!(task.priority, 5);
    }
}
