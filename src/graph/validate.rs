// SPDX-License-Identifier: MIT

//! Structural graph validation
//!
//! `validate` runs before every execution and rejects graphs that cannot
//! possibly run: dangling edges and a missing or unknown start node. A node
//! with no exit is a runtime concern (the walk may never reach it), so the
//! basic pass only flags it under `validate_strict`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::GraphBuildError;

use super::edge::Edge;
use super::node::Node;

/// Reject graphs with edges into nowhere or no runnable start node
pub fn validate(
    nodes: &HashMap<String, Arc<dyn Node>>,
    edges: &[Edge],
    start: Option<&str>,
) -> Result<(), GraphBuildError> {
    for edge in edges {
        if !nodes.contains_key(&edge.source) {
            return Err(GraphBuildError::DanglingEdge(edge.source.clone()));
        }
        if !nodes.contains_key(&edge.target) {
            return Err(GraphBuildError::DanglingEdge(edge.target.clone()));
        }
    }

    match start {
        None => Err(GraphBuildError::MissingStart),
        Some(id) if !nodes.contains_key(id) => Err(GraphBuildError::UnknownStart(id.to_string())),
        Some(_) => Ok(()),
    }
}

/// Additionally reject nodes that can never hand off: no outgoing edges and
/// not marked terminal. The basic pass tolerates these because the walk
/// surfaces them as a dead end only if it actually arrives there.
pub fn validate_strict(
    nodes: &HashMap<String, Arc<dyn Node>>,
    edges: &[Edge],
    start: Option<&str>,
    terminal: &HashSet<String>,
) -> Result<(), GraphBuildError> {
    validate(nodes, edges, start)?;

    let with_exits: HashSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();
    for id in nodes.keys() {
        if !with_exits.contains(id.as_str()) && !terminal.contains(id) {
            return Err(GraphBuildError::NoExit(id.clone()));
        }
    }
    Ok(())
}

/// Non-fatal findings worth logging: unreachable nodes and missing exits
pub fn warnings(
    nodes: &HashMap<String, Arc<dyn Node>>,
    edges: &[Edge],
    start: Option<&str>,
    terminal: &HashSet<String>,
) -> Vec<String> {
    let mut findings = Vec::new();

    let with_exits: HashSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();
    for id in nodes.keys() {
        if !with_exits.contains(id.as_str()) && !terminal.contains(id) {
            findings.push(format!(
                "node '{}' has no outgoing edges and is not terminal",
                id
            ));
        }
    }

    if let Some(start) = start {
        let mut reachable = HashSet::new();
        let mut frontier = vec![start];
        while let Some(id) = frontier.pop() {
            if !reachable.insert(id) {
                continue;
            }
            for edge in edges.iter().filter(|e| e.source == id) {
                frontier.push(edge.target.as_str());
            }
        }
        // Reachability here ignores conditions and outcome overrides, so an
        // unreachable node is advisory only
        for id in nodes.keys() {
            if !reachable.contains(id.as_str()) {
                findings.push(format!("node '{}' is unreachable from '{}'", id, start));
            }
        }
    }

    findings
}
