// SPDX-License-Identifier: MIT

//! Result aggregation across branches and agents
//!
//! One set of strategies serves both the in-graph aggregator node (merging
//! predecessor branch outputs) and the coordinator (merging per-agent task
//! results after a fan-out).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::LatticeError;
use crate::state::ExecutionState;

use super::node::{Node, NodeOutcome};

/// Policy for a key written by more than one source during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Later source wins (in input order)
    LastWriteWins,
    /// Earlier source wins
    FirstWriteWins,
    /// Conflicting key is an error
    Reject,
}

/// How to combine multiple results into one
#[derive(Debug, Clone)]
pub enum AggregationStrategy {
    /// Union of object fields across sources
    Merge { on_conflict: ConflictPolicy },
    /// Largest group of agreeing values must cover at least `threshold`
    /// of all inputs (failed inputs count against the ratio)
    Consensus { threshold: f64 },
    /// Sum weights per distinct value; the heaviest value wins
    Weighted,
}

/// One source's contribution to an aggregation
#[derive(Debug, Clone)]
pub struct AggregationInput {
    /// Where the value came from (branch output key, agent id, ...)
    pub source: String,
    pub value: Value,
    pub weight: f64,
    /// False when the source failed to produce a value
    pub success: bool,
}

impl AggregationInput {
    pub fn ok(source: impl Into<String>, value: Value) -> Self {
        Self {
            source: source.into(),
            value,
            weight: 1.0,
            success: true,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            source: source.into(),
            value: json!({ "error": error.to_string() }),
            weight: 1.0,
            success: false,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Apply a strategy to a set of inputs
pub fn aggregate(
    strategy: &AggregationStrategy,
    inputs: &[AggregationInput],
) -> Result<Value, LatticeError> {
    if inputs.is_empty() {
        return Err(LatticeError::other("nothing to aggregate"));
    }

    match strategy {
        AggregationStrategy::Merge { on_conflict } => merge(inputs, *on_conflict),
        AggregationStrategy::Consensus { threshold } => consensus(inputs, *threshold),
        AggregationStrategy::Weighted => weighted(inputs),
    }
}

fn merge(inputs: &[AggregationInput], on_conflict: ConflictPolicy) -> Result<Value, LatticeError> {
    let mut merged = Map::new();

    for input in inputs.iter().filter(|i| i.success) {
        match &input.value {
            Value::Object(obj) => {
                for (k, v) in obj {
                    if merged.contains_key(k) {
                        match on_conflict {
                            ConflictPolicy::LastWriteWins => {
                                merged.insert(k.clone(), v.clone());
                            }
                            ConflictPolicy::FirstWriteWins => {}
                            ConflictPolicy::Reject => {
                                if merged.get(k) != Some(v) {
                                    return Err(LatticeError::AggregationConflict {
                                        key: k.clone(),
                                    });
                                }
                            }
                        }
                    } else {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
            // Non-object contributions are kept under their source name
            other => {
                merged.insert(input.source.clone(), other.clone());
            }
        }
    }

    Ok(Value::Object(merged))
}

fn consensus(inputs: &[AggregationInput], threshold: f64) -> Result<Value, LatticeError> {
    let total = inputs.len();

    // Group agreeing successful values; failures never join a group
    let mut groups: Vec<(&Value, usize)> = Vec::new();
    for input in inputs.iter().filter(|i| i.success) {
        match groups.iter_mut().find(|(v, _)| *v == &input.value) {
            Some((_, count)) => *count += 1,
            None => groups.push((&input.value, 1)),
        }
    }

    let (value, agreed) = groups
        .iter()
        .max_by_key(|(_, count)| *count)
        .map(|(v, c)| ((*v).clone(), *c))
        .unwrap_or((Value::Null, 0));

    let ratio = agreed as f64 / total as f64;
    if ratio + f64::EPSILON < threshold {
        return Err(LatticeError::ConsensusNotReached {
            agreed,
            total,
            threshold,
        });
    }

    Ok(json!({
        "value": value,
        "agreed": agreed,
        "total": total,
    }))
}

fn weighted(inputs: &[AggregationInput]) -> Result<Value, LatticeError> {
    let mut groups: Vec<(&Value, f64)> = Vec::new();
    for input in inputs.iter().filter(|i| i.success) {
        match groups.iter_mut().find(|(v, _)| *v == &input.value) {
            Some((_, weight)) => *weight += input.weight,
            None => groups.push((&input.value, input.weight)),
        }
    }

    groups
        .into_iter()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(v, _)| v.clone())
        .ok_or_else(|| LatticeError::other("no successful inputs to weigh"))
}

/// Node that merges values from several state keys (typically outputs of
/// predecessor branches) and writes the combined result back to state
pub struct AggregatorNode {
    id: String,
    description: String,
    /// State keys to read; a missing key counts as a failed input
    source_keys: Vec<(String, f64)>,
    strategy: AggregationStrategy,
    output_key: String,
}

impl AggregatorNode {
    pub fn new(
        id: impl Into<String>,
        source_keys: Vec<String>,
        strategy: AggregationStrategy,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            source_keys: source_keys.into_iter().map(|k| (k, 1.0)).collect(),
            strategy,
            output_key: output_key.into(),
        }
    }

    /// Weighted sources for the `Weighted` strategy
    pub fn with_weights(mut self, weights: Vec<(String, f64)>) -> Self {
        self.source_keys = weights;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Node for AggregatorNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let inputs: Vec<AggregationInput> = self
            .source_keys
            .iter()
            .map(|(key, weight)| match state.get_path(key) {
                Some(value) => AggregationInput::ok(key.clone(), value.clone()).with_weight(*weight),
                None => AggregationInput::failed(key.clone(), "missing"),
            })
            .collect();

        let result = aggregate(&self.strategy, &inputs)?;
        state.set(&self.output_key, result.clone());
        Ok(NodeOutcome::value(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(source: &str, value: Value) -> AggregationInput {
        AggregationInput::ok(source, value)
    }

    #[test]
    fn test_merge_union_of_fields() {
        let inputs = vec![
            ok("a", json!({"x": 1})),
            ok("b", json!({"y": 2})),
        ];
        let strategy = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::LastWriteWins,
        };
        assert_eq!(aggregate(&strategy, &inputs).unwrap(), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn test_merge_conflict_policies() {
        let inputs = vec![
            ok("a", json!({"x": 1})),
            ok("b", json!({"x": 2})),
        ];

        let last = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::LastWriteWins,
        };
        assert_eq!(aggregate(&last, &inputs).unwrap(), json!({"x": 2}));

        let first = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::FirstWriteWins,
        };
        assert_eq!(aggregate(&first, &inputs).unwrap(), json!({"x": 1}));

        let reject = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::Reject,
        };
        assert!(matches!(
            aggregate(&reject, &inputs),
            Err(LatticeError::AggregationConflict { .. })
        ));
    }

    #[test]
    fn test_merge_reject_tolerates_identical_values() {
        let inputs = vec![
            ok("a", json!({"x": 1})),
            ok("b", json!({"x": 1})),
        ];
        let reject = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::Reject,
        };
        assert_eq!(aggregate(&reject, &inputs).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_merge_scalar_under_source_name() {
        let inputs = vec![ok("branch_a", json!(42))];
        let strategy = AggregationStrategy::Merge {
            on_conflict: ConflictPolicy::LastWriteWins,
        };
        assert_eq!(aggregate(&strategy, &inputs).unwrap(), json!({"branch_a": 42}));
    }

    #[test]
    fn test_consensus_reached_at_threshold() {
        // 3 of 5 agree = 0.6, meets a 0.6 threshold exactly
        let inputs = vec![
            ok("a", json!("yes")),
            ok("b", json!("yes")),
            ok("c", json!("yes")),
            ok("d", json!("no")),
            ok("e", json!("maybe")),
        ];
        let strategy = AggregationStrategy::Consensus { threshold: 0.6 };
        let result = aggregate(&strategy, &inputs).unwrap();
        assert_eq!(result["value"], json!("yes"));
        assert_eq!(result["agreed"], json!(3));
        assert_eq!(result["total"], json!(5));
    }

    #[test]
    fn test_consensus_below_threshold_fails_with_detail() {
        let inputs = vec![
            ok("a", json!("yes")),
            ok("b", json!("no")),
            AggregationInput::failed("c", "agent down"),
            AggregationInput::failed("d", "agent down"),
        ];
        let strategy = AggregationStrategy::Consensus { threshold: 0.6 };
        match aggregate(&strategy, &inputs) {
            Err(LatticeError::ConsensusNotReached { agreed, total, threshold }) => {
                assert_eq!(agreed, 1);
                assert_eq!(total, 4);
                assert!((threshold - 0.6).abs() < f64::EPSILON);
            }
            other => panic!("expected ConsensusNotReached, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_failed_inputs_count_against_consensus() {
        let inputs = vec![
            ok("a", json!("yes")),
            AggregationInput::failed("b", "down"),
            AggregationInput::failed("c", "down"),
        ];
        let strategy = AggregationStrategy::Consensus { threshold: 0.6 };
        assert!(aggregate(&strategy, &inputs).is_err());
    }

    #[test]
    fn test_weighted_heaviest_value_wins() {
        let inputs = vec![
            ok("a", json!("alpha")).with_weight(1.0),
            ok("b", json!("beta")).with_weight(2.5),
            ok("c", json!("alpha")).with_weight(1.0),
        ];
        let strategy = AggregationStrategy::Weighted;
        assert_eq!(aggregate(&strategy, &inputs).unwrap(), json!("beta"));
    }

    #[test]
    fn test_weighted_groups_accumulate() {
        let inputs = vec![
            ok("a", json!("alpha")).with_weight(1.5),
            ok("b", json!("beta")).with_weight(2.0),
            ok("c", json!("alpha")).with_weight(1.0),
        ];
        // alpha accumulates 2.5 > beta 2.0
        assert_eq!(
            aggregate(&AggregationStrategy::Weighted, &inputs).unwrap(),
            json!("alpha")
        );
    }

    #[test]
    fn test_empty_inputs_error() {
        let strategy = AggregationStrategy::Weighted;
        assert!(aggregate(&strategy, &[]).is_err());
    }

    #[tokio::test]
    async fn test_aggregator_node_reads_state_and_writes_result() {
        let mut state = ExecutionState::empty();
        state.set("branch_a", json!({"score": 1}));
        state.set("branch_b", json!({"extra": true}));

        let node = AggregatorNode::new(
            "gather",
            vec!["branch_a".to_string(), "branch_b".to_string()],
            AggregationStrategy::Merge {
                on_conflict: ConflictPolicy::LastWriteWins,
            },
            "combined",
        );

        let outcome = node.execute(&mut state).await.unwrap();
        assert_eq!(outcome.value, json!({"score": 1, "extra": true}));
        assert_eq!(state.get("combined"), Some(&json!({"score": 1, "extra": true})));
    }

    #[tokio::test]
    async fn test_aggregator_node_missing_source_counts_as_failure() {
        let mut state = ExecutionState::empty();
        state.set("branch_a", json!("yes"));

        let node = AggregatorNode::new(
            "gather",
            vec!["branch_a".to_string(), "branch_b".to_string()],
            AggregationStrategy::Consensus { threshold: 0.6 },
            "combined",
        );

        assert!(node.execute(&mut state).await.is_err());
    }
}
