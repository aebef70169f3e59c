// SPDX-License-Identifier: MIT

//! Compile a [`GraphDefinition`] into a runnable [`GraphExecutor`]
//!
//! All condition expressions are parsed here, so a malformed `when` is a
//! build failure rather than a runtime surprise.

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::definition::{
    ConflictDef, EdgeDef, GraphDefinition, NodeDef, NodeKindDef, StrategyDef,
};
use crate::error::LatticeError;
use crate::graph::{
    ActionNode, AggregationStrategy, AggregatorNode, ConditionalNode, ConflictPolicy, Edge,
    FunctionNode, GraphExecutor, LoopNode, Node, RetryingNode,
};
use crate::retry::RetryPolicy;

pub struct GraphBuilder;

impl GraphBuilder {
    /// Resolve capabilities, build nodes and edges, wire start/terminal
    pub async fn compile(
        definition: &GraphDefinition,
        registry: &CapabilityRegistry,
    ) -> Result<GraphExecutor, LatticeError> {
        let mut executor = GraphExecutor::new(&definition.name);

        for def in &definition.nodes {
            let node = Self::build_node(def, registry).await?;
            executor.add_node(node)?;
        }

        for edge in &definition.edges {
            executor.add_edge(Self::build_edge(edge)?)?;
        }

        if let Some(start) = &definition.start {
            executor.set_start(start)?;
        }
        for id in &definition.terminal {
            executor.mark_terminal(id)?;
        }

        log::info!(
            "compiled graph '{}': {} nodes, {} edges",
            definition.name,
            definition.nodes.len(),
            definition.edges.len()
        );
        Ok(executor)
    }

    fn build_edge(def: &EdgeDef) -> Result<Edge, LatticeError> {
        let edge = Edge::new(&def.from, &def.to).with_priority(def.priority);
        match &def.when {
            Some(expr) => edge.when_parsed(expr),
            None => Ok(edge),
        }
    }

    // Boxed for the loop-body recursion
    fn build_node<'a>(
        def: &'a NodeDef,
        registry: &'a CapabilityRegistry,
    ) -> BoxFuture<'a, Result<Arc<dyn Node>, LatticeError>> {
        Box::pin(async move {
            let node: Arc<dyn Node> = match &def.kind {
                NodeKindDef::Function {
                    capability,
                    params,
                    output,
                    retry,
                } => {
                    let capability = registry.get(capability).await.ok_or_else(|| {
                        LatticeError::CapabilityNotFound {
                            name: capability.clone(),
                        }
                    })?;
                    let mut node = FunctionNode::new(&def.id, capability, output)
                        .with_params(params.clone());
                    if let Some(description) = &def.description {
                        node = node.with_description(description);
                    }
                    match retry {
                        Some(retry) => {
                            let mut policy = RetryPolicy::new(retry.max_attempts);
                            if let Some(interval) = retry.initial_interval {
                                policy = policy.with_initial_interval(interval);
                            }
                            if let Some(factor) = retry.backoff_factor {
                                policy = policy.with_backoff_factor(factor);
                            }
                            Arc::new(RetryingNode::new(Arc::new(node), policy))
                        }
                        None => Arc::new(node),
                    }
                }
                NodeKindDef::Conditional {
                    when,
                    on_true,
                    on_false,
                } => {
                    let mut node = ConditionalNode::parse(&def.id, when, on_true, on_false)?;
                    if let Some(description) = &def.description {
                        node = node.with_description(description);
                    }
                    Arc::new(node)
                }
                NodeKindDef::Loop {
                    condition,
                    max_iterations,
                    body,
                    exit_to,
                } => {
                    let body = Self::build_node(body, registry).await?;
                    let mut node = LoopNode::parse(&def.id, condition, *max_iterations, body)?;
                    if let Some(target) = exit_to {
                        node = node.with_exit_to(target);
                    }
                    if let Some(description) = &def.description {
                        node = node.with_description(description);
                    }
                    Arc::new(node)
                }
                NodeKindDef::Action {
                    request_key,
                    output,
                    fallback,
                    params,
                } => {
                    let mut node = ActionNode::new(&def.id, registry.clone(), request_key, output)
                        .with_params(params.clone());
                    if let Some(name) = fallback {
                        node = node.with_fallback(name);
                    }
                    if let Some(description) = &def.description {
                        node = node.with_description(description);
                    }
                    Arc::new(node)
                }
                NodeKindDef::Aggregator {
                    sources,
                    strategy,
                    output,
                } => {
                    let weights: Vec<(String, f64)> = sources
                        .iter()
                        .map(|s| (s.key().to_string(), s.weight()))
                        .collect();
                    let keys: Vec<String> = weights.iter().map(|(k, _)| k.clone()).collect();
                    let mut node =
                        AggregatorNode::new(&def.id, keys, Self::build_strategy(strategy), output)
                            .with_weights(weights);
                    if let Some(description) = &def.description {
                        node = node.with_description(description);
                    }
                    Arc::new(node)
                }
            };
            Ok(node)
        })
    }

    fn build_strategy(def: &StrategyDef) -> AggregationStrategy {
        match def {
            StrategyDef::Merge { on_conflict } => AggregationStrategy::Merge {
                on_conflict: match on_conflict {
                    ConflictDef::LastWriteWins => ConflictPolicy::LastWriteWins,
                    ConflictDef::FirstWriteWins => ConflictPolicy::FirstWriteWins,
                    ConflictDef::Reject => ConflictPolicy::Reject,
                },
            },
            StrategyDef::Consensus { threshold } => AggregationStrategy::Consensus {
                threshold: *threshold,
            },
            StrategyDef::Weighted => AggregationStrategy::Weighted,
        }
    }
}
