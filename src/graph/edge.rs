// SPDX-License-Identifier: MIT

//! Edges and edge resolution
//!
//! An edge is a directed, optionally conditioned transition. The router
//! evaluates a node's outgoing edges against current state and picks the
//! first whose condition holds; not finding one on a non-terminal node is an
//! explicit dead end, never a silent stop.

use crate::condition::{self, Expression};
use crate::error::LatticeError;
use crate::state::ExecutionState;

/// Directed transition between two nodes
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// None means unconditional (always satisfied)
    pub condition: Option<Expression>,
    /// Higher priority edges are tried first under `PriorityThenOrder`
    pub priority: i32,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
            priority: 0,
        }
    }

    pub fn when(mut self, condition: Expression) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Parse `expr` as this edge's condition
    pub fn when_parsed(mut self, expr: &str) -> Result<Self, LatticeError> {
        let condition = condition::parse(expr).map_err(|e| {
            LatticeError::Build(crate::error::GraphBuildError::InvalidCondition {
                from_node: self.source.clone(),
                target: self.target.clone(),
                message: e.to_string(),
            })
        })?;
        self.condition = Some(condition);
        Ok(self)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Tie-breaking rule when several edge conditions hold at once.
///
/// The default tries higher priority first, then declaration order. The
/// alternative ignores priorities entirely, which matches engines that treat
/// edge order as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingPolicy {
    #[default]
    PriorityThenOrder,
    DeclarationOrder,
}

/// Evaluate `node`'s outgoing edges and pick the first satisfied one.
///
/// Returns `Ok(None)` when no edge condition holds - the executor decides
/// whether that is completion (terminal node) or a dead end. A failed
/// condition evaluation is tagged with the offending edge.
pub fn resolve_next<'a>(
    node: &str,
    edges: &'a [Edge],
    policy: RoutingPolicy,
    state: &ExecutionState,
) -> Result<Option<&'a Edge>, LatticeError> {
    let mut outgoing: Vec<&Edge> = edges.iter().filter(|e| e.source == node).collect();

    if policy == RoutingPolicy::PriorityThenOrder {
        // Stable sort keeps declaration order within equal priorities
        outgoing.sort_by_key(|e| std::cmp::Reverse(e.priority));
    }

    for edge in outgoing {
        let satisfied = match &edge.condition {
            None => true,
            Some(expr) => {
                condition::evaluate(expr, state).map_err(|e| LatticeError::EdgeCondition {
                    from_node: edge.source.clone(),
                    target: edge.target.clone(),
                    cause: e,
                })?
            }
        };
        if satisfied {
            return Ok(Some(edge));
        }
    }

    Ok(None)
}
