// SPDX-License-Identifier: MIT

//! Condition expression evaluator
//!
//! Evaluation is strict: comparing against a state key that does not exist
//! yields `EvalError::UnresolvedKey` rather than quietly reading as false.
//! The one exception is `== null` / `!= null`, where an absent key is the
//! thing being tested for.

use super::ast::{CompareOp, Expression, Literal};
use crate::error::EvalError;
use crate::state::ExecutionState;
use serde_json::Value;

/// Evaluate a condition expression against execution state
pub fn evaluate(expr: &Expression, state: &ExecutionState) -> Result<bool, EvalError> {
    match expr {
        Expression::True => Ok(true),
        Expression::False => Ok(false),
        Expression::Compare { left, op, right } => evaluate_compare(left, op, right, state),
        Expression::And(left, right) => Ok(evaluate(left, state)? && evaluate(right, state)?),
        Expression::Or(left, right) => Ok(evaluate(left, state)? || evaluate(right, state)?),
        Expression::Not(inner) => Ok(!evaluate(inner, state)?),
    }
}

fn evaluate_compare(
    left: &str,
    op: &CompareOp,
    right: &Literal,
    state: &ExecutionState,
) -> Result<bool, EvalError> {
    let left_value = state.get_path(left);

    // Null checks are how callers probe for absent keys
    if matches!(right, Literal::Null) {
        let is_null = matches!(left_value, None | Some(Value::Null));
        return match op {
            CompareOp::Eq => Ok(is_null),
            CompareOp::NotEq => Ok(!is_null),
            _ => Err(EvalError::TypeMismatch {
                key: left.to_string(),
                op: op.to_string(),
            }),
        };
    }

    let left_value = left_value.ok_or_else(|| EvalError::UnresolvedKey(left.to_string()))?;

    match op {
        CompareOp::Eq => Ok(values_equal(left_value, right)),
        CompareOp::NotEq => Ok(!values_equal(left_value, right)),
        CompareOp::Gt => compare_numbers(left, left_value, right, op, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, left_value, right, op, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, left_value, right, op, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, left_value, right, op, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, left_value, right),
    }
}

fn values_equal(left: &Value, right: &Literal) -> bool {
    match (left, right) {
        (Value::String(s), Literal::String(rs)) => s == rs,
        (Value::Number(n), Literal::Number(rn)) => n
            .as_f64()
            .map(|f| (f - rn).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::Bool(b), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}

fn compare_numbers<F>(
    key: &str,
    left: &Value,
    right: &Literal,
    op: &CompareOp,
    cmp: F,
) -> Result<bool, EvalError>
where
    F: Fn(f64, f64) -> bool,
{
    match (left, right) {
        (Value::Number(n), Literal::Number(rn)) => {
            let f = n.as_f64().ok_or_else(|| EvalError::TypeMismatch {
                key: key.to_string(),
                op: op.to_string(),
            })?;
            Ok(cmp(f, *rn))
        }
        _ => Err(EvalError::TypeMismatch {
            key: key.to_string(),
            op: op.to_string(),
        }),
    }
}

fn check_contains(key: &str, left: &Value, right: &Literal) -> Result<bool, EvalError> {
    match (left, right) {
        // String contains substring
        (Value::String(s), Literal::String(substr)) => Ok(s.contains(substr.as_str())),
        // Array contains value
        (Value::Array(arr), Literal::String(val)) => {
            Ok(arr.iter().any(|v| v.as_str() == Some(val.as_str())))
        }
        (Value::Array(arr), Literal::Number(val)) => Ok(arr.iter().any(|v| {
            v.as_f64()
                .map(|f| (f - val).abs() < f64::EPSILON)
                .unwrap_or(false)
        })),
        (Value::Array(arr), Literal::Boolean(val)) => {
            Ok(arr.iter().any(|v| v.as_bool() == Some(*val)))
        }
        _ => Err(EvalError::TypeMismatch {
            key: key.to_string(),
            op: CompareOp::Contains.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::parser::parse;
    use serde_json::json;

    fn state_with(pairs: Vec<(&str, Value)>) -> ExecutionState {
        let mut state = ExecutionState::empty();
        for (k, v) in pairs {
            state.set(k, v);
        }
        state
    }

    fn eval(expr: &str, state: &ExecutionState) -> bool {
        evaluate(&parse(expr).unwrap(), state).unwrap()
    }

    #[test]
    fn test_string_equality() {
        let state = state_with(vec![("intent", json!("search"))]);
        assert!(eval("intent == 'search'", &state));
        assert!(!eval("intent == 'code'", &state));
        assert!(eval("intent != 'code'", &state));
    }

    #[test]
    fn test_number_comparison() {
        let state = state_with(vec![("score", json!(7.5))]);

        assert!(eval("score > 5", &state));
        assert!(!eval("score > 10", &state));
        assert!(eval("score >= 7.5", &state));
        assert!(!eval("score >= 8", &state));
        assert!(eval("score < 10", &state));
        assert!(eval("score <= 7.5", &state));
    }

    #[test]
    fn test_comparison_boundary_is_exclusive() {
        // value > 10 must be false at exactly 10 and true at 11
        let state = state_with(vec![("value", json!(10))]);
        assert!(!eval("value > 10", &state));

        let state = state_with(vec![("value", json!(11))]);
        assert!(eval("value > 10", &state));
    }

    #[test]
    fn test_boolean_comparison() {
        let state = state_with(vec![("is_draft", json!(true))]);
        assert!(eval("is_draft == true", &state));
        assert!(!eval("is_draft == false", &state));
        // Bare key reads as a boolean test
        assert!(eval("is_draft", &state));
        assert!(!eval("not is_draft", &state));
    }

    #[test]
    fn test_null_check_tolerates_missing_key() {
        let state = state_with(vec![("result", json!(null))]);

        assert!(eval("result == null", &state));
        assert!(!eval("result != null", &state));
        assert!(eval("nonexistent == null", &state));
        assert!(!eval("nonexistent != null", &state));
    }

    #[test]
    fn test_unresolved_key_is_an_error() {
        let state = ExecutionState::empty();
        let expr = parse("missing == 'value'").unwrap();
        assert!(matches!(
            evaluate(&expr, &state),
            Err(EvalError::UnresolvedKey(k)) if k == "missing"
        ));

        let expr = parse("missing > 5").unwrap();
        assert!(matches!(
            evaluate(&expr, &state),
            Err(EvalError::UnresolvedKey(_))
        ));
    }

    #[test]
    fn test_ordering_on_non_number_is_type_error() {
        let state = state_with(vec![("name", json!("abc"))]);
        let expr = parse("name > 5").unwrap();
        assert!(matches!(
            evaluate(&expr, &state),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_contains_string_and_array() {
        let state = state_with(vec![
            ("message", json!("hello world")),
            ("tags", json!(["bug", "urgent"])),
        ]);

        assert!(eval("message contains 'world'", &state));
        assert!(!eval("message contains 'foo'", &state));
        assert!(eval("tags contains 'bug'", &state));
        assert!(!eval("tags contains 'frontend'", &state));
    }

    #[test]
    fn test_and_or_not() {
        let state = state_with(vec![("intent", json!("code")), ("confidence", json!(0.9))]);

        assert!(eval("intent == 'code' and confidence > 0.8", &state));
        assert!(!eval("intent == 'code' and confidence > 0.95", &state));
        assert!(eval("intent == 'search' or confidence > 0.8", &state));
        assert!(eval("not (intent == 'search')", &state));
    }

    #[test]
    fn test_eval_error_propagates_through_combinators() {
        let state = state_with(vec![("a", json!(1))]);
        let expr = parse("a == 1 and missing > 2").unwrap();
        assert!(evaluate(&expr, &state).is_err());
    }

    #[test]
    fn test_nested_path() {
        let state = state_with(vec![("result", json!({"data": {"intent": "search"}}))]);
        assert!(eval("result.data.intent == 'search'", &state));
        assert!(!eval("result.data.intent == 'code'", &state));
    }

    #[test]
    fn test_literal_true_false() {
        let state = ExecutionState::empty();
        assert!(eval("true", &state));
        assert!(!eval("false", &state));
    }
}
