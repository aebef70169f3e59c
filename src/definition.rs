// SPDX-License-Identifier: MIT

//! YAML schema types for graph definitions
//!
//! A definition declares the state schema, the nodes with their kinds, the
//! conditioned edges, and the start/terminal markers. Compilation into a
//! runnable executor lives in [`crate::builder`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::LatticeError;
use crate::state::StateSchema;

/// Top-level graph definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// State schema seeding defaults and reducers
    #[serde(default)]
    pub state: StateSchema,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    /// Defaults to the first declared node
    pub start: Option<String>,
    #[serde(default)]
    pub terminal: Vec<String>,
}

impl GraphDefinition {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LatticeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, LatticeError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// A declared node: id plus kind-specific fields
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeDef {
    pub id: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKindDef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKindDef {
    /// Invoke a named capability, store its output in state
    Function {
        capability: String,
        #[serde(default)]
        params: Value,
        output: String,
        retry: Option<RetryDef>,
    },
    /// Evaluate an expression, route to one of two nodes
    Conditional {
        when: String,
        on_true: String,
        on_false: String,
    },
    /// Repeat a body node while the condition holds, hard-capped
    Loop {
        #[serde(rename = "while")]
        condition: String,
        max_iterations: u32,
        body: Box<NodeDef>,
        exit_to: Option<String>,
    },
    /// Select a capability at runtime from a state-held request
    Action {
        request_key: String,
        output: String,
        fallback: Option<String>,
        #[serde(default)]
        params: Value,
    },
    /// Combine values from several state keys into one
    Aggregator {
        sources: Vec<SourceDef>,
        strategy: StrategyDef,
        output: String,
    },
}

/// Aggregation source: a bare key or a key with a weight
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceDef {
    Key(String),
    Weighted { key: String, weight: f64 },
}

impl SourceDef {
    pub fn key(&self) -> &str {
        match self {
            SourceDef::Key(k) => k,
            SourceDef::Weighted { key, .. } => key,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            SourceDef::Key(_) => 1.0,
            SourceDef::Weighted { weight, .. } => *weight,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StrategyDef {
    Merge {
        #[serde(default)]
        on_conflict: ConflictDef,
    },
    Consensus {
        threshold: f64,
    },
    Weighted,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDef {
    #[default]
    LastWriteWins,
    FirstWriteWins,
    Reject,
}

/// Retry settings for a function node
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryDef {
    pub max_attempts: u32,
    pub initial_interval: Option<f64>,
    pub backoff_factor: Option<f64>,
}

/// A directed, optionally conditioned edge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    pub when: Option<String>,
    #[serde(default)]
    pub priority: i32,
}
