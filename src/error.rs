// SPDX-License-Identifier: MIT

//! Typed error handling for lattice-rs
//!
//! Build-time problems (malformed graphs) are kept apart from runtime
//! outcomes (routing dead ends, budget exhaustion) so callers can tell a
//! broken graph from a run that legitimately failed.

use thiserror::Error;

/// Top-level error type for lattice-rs
#[derive(Debug, Error)]
pub enum LatticeError {
    /// Graph construction or validation errors - fatal before execution starts
    #[error("Graph build error: {0}")]
    Build(#[from] GraphBuildError),

    /// No satisfiable outgoing edge from a non-terminal node
    #[error("Routing dead end at node '{node}'")]
    RoutingDeadEnd { node: String },

    /// Step budget exhausted mid-run
    #[error("Execution budget exceeded after {steps} steps")]
    BudgetExceeded { steps: u64 },

    /// Workflow-level timeout hit at a node boundary (terminal, not resumable)
    #[error("Execution timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Condition evaluation failed while resolving an edge
    #[error("Edge condition failed on {from_node} -> {target}: {cause}")]
    EdgeCondition {
        from_node: String,
        target: String,
        #[source]
        cause: EvalError,
    },

    /// Condition evaluation failed inside a node
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// An external capability (LLM, tool, plain computation) failed
    #[error("Capability '{name}' failed: {message}")]
    Capability { name: String, message: String },

    /// Capability not present in the registry
    #[error("Capability '{name}' not found")]
    CapabilityNotFound { name: String },

    /// Action node received malformed or missing parameters
    #[error("Parameter validation failed for '{capability}': {message}")]
    ParameterValidation { capability: String, message: String },

    /// State access errors (missing key, wrong type)
    #[error(transparent)]
    State(#[from] StateError),

    /// Checkpoint persistence or integrity errors
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// No registered agent can take a task
    #[error("No eligible agent for task '{task_id}'")]
    NoEligibleAgent { task_id: String },

    /// Agent id already registered with the coordinator
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    /// Consensus aggregation fell below the agreement threshold
    #[error("Consensus not reached: {agreed}/{total} agreed, threshold {threshold}")]
    ConsensusNotReached {
        agreed: usize,
        total: usize,
        threshold: f64,
    },

    /// Merge aggregation hit a conflicting key under the Reject policy
    #[error("Aggregation conflict on key '{key}'")]
    AggregationConflict { key: String },

    /// Shared-state write rejected by the conflict policy
    #[error("Conflicting write to shared key '{key}'")]
    SharedStateConflict { key: String },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Malformed graph errors, detected at build/validation time, never at runtime
#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge references unknown node: {0}")]
    DanglingEdge(String),

    #[error("Start node is not set")]
    MissingStart,

    #[error("Start node '{0}' does not exist")]
    UnknownStart(String),

    #[error("Node '{0}' has no outgoing edges and is not marked terminal")]
    NoExit(String),

    #[error("Graph is sealed: cannot mutate after first execution")]
    Sealed,

    #[error("Invalid condition on edge {from_node} -> {target}: {message}")]
    InvalidCondition {
        from_node: String,
        target: String,
        message: String,
    },

    #[error("Invalid node definition '{id}': {message}")]
    InvalidNode { id: String, message: String },
}

/// Condition expression evaluation errors
#[derive(Debug, Error)]
pub enum EvalError {
    /// The expression references a state key that does not exist
    #[error("Unresolved state key '{0}' in condition")]
    UnresolvedKey(String),

    /// Operand types do not support the requested comparison
    #[error("Type mismatch evaluating '{key}' with operator {op}")]
    TypeMismatch { key: String, op: String },

    /// The expression text could not be parsed
    #[error("Could not parse condition: {0}")]
    Parse(String),
}

/// State container access errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State key not found: {0}")]
    KeyNotFound(String),

    #[error("State key '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Checkpoint persistence and integrity errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("No checkpoints exist for execution '{0}'")]
    NoCheckpoints(String),

    #[error("Checkpoint '{id}' failed integrity check")]
    Integrity { id: String },

    #[error("Checkpoint sequence {got} is not after {last} for execution '{execution_id}'")]
    OutOfOrder {
        execution_id: String,
        got: u64,
        last: u64,
    },

    #[error("Partial checkpoint write: {written}/{total} replicas acknowledged")]
    PartialWrite { written: usize, total: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LatticeError {
    /// Create a capability error
    pub fn capability(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a parameter validation error
    pub fn parameter(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParameterValidation {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether retrying the failed operation can possibly help.
    ///
    /// Only external capability failures are transient; everything else in the
    /// taxonomy is either a build defect or a deliberate terminal outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }
}

impl From<String> for LatticeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for LatticeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}
