// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Parses expressions like:
//! - `field == 'value'`
//! - `score > 0.8`
//! - `a == 'x' and b > 5`
//! - `not (status == 'done' || attempts >= 3)`
//!
//! Precedence, loosest first: `or`/`||`, `and`/`&&`, `not`/`!`, comparison.
//! Parentheses group sub-expressions.

use super::ast::{CompareOp, Expression, Literal};
use crate::error::EvalError;

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, EvalError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(EvalError::Parse("empty expression".to_string()));
    }

    // Or binds loosest, so split on it first
    if let Some((pos, len)) = find_top_level(input, &[" or ", "||"]) {
        let left = parse(&input[..pos])?;
        let right = parse(&input[pos + len..])?;
        return Ok(Expression::Or(Box::new(left), Box::new(right)));
    }

    if let Some((pos, len)) = find_top_level(input, &[" and ", "&&"]) {
        let left = parse(&input[..pos])?;
        let right = parse(&input[pos + len..])?;
        return Ok(Expression::And(Box::new(left), Box::new(right)));
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }
    if let Some(rest) = input.strip_prefix('!') {
        // A leading bang is negation; "!=" only occurs inside a comparison
        if !rest.starts_with('=') {
            return Ok(Expression::Not(Box::new(parse(rest)?)));
        }
    }

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }

    if input == "true" {
        return Ok(Expression::True);
    }
    if input == "false" {
        return Ok(Expression::False);
    }

    parse_comparison(input)
}

/// Find the first occurrence of any of `patterns` at paren depth 0, outside
/// string literals. Returns (byte position, pattern length).
fn find_top_level(input: &str, patterns: &[&str]) -> Option<(usize, usize)> {
    let mut depth = 0i32;
    let mut in_string = false;

    for (i, c) in input.char_indices() {
        if c == '\'' || c == '"' {
            in_string = !in_string;
        } else if !in_string {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if depth == 0 => {
                    for pat in patterns {
                        if input[i..].starts_with(pat) {
                            return Some((i, pat.len()));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// If the whole input is one parenthesized group, return its interior
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    for (i, c) in input.char_indices() {
        if c == '\'' || c == '"' {
            in_string = !in_string;
        } else if !in_string {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                // Closed the opening paren before the end: not one group
                if depth == 0 && i != input.len() - 1 {
                    return None;
                }
            }
        }
    }

    Some(&input[1..input.len() - 1])
}

fn parse_comparison(input: &str) -> Result<Expression, EvalError> {
    // Longest operators first so ">=" is not read as ">"
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (op_str, op) in operators {
        if let Some(pos) = find_operator(input, op_str) {
            let left = input[..pos].trim().to_string();
            if left.is_empty() {
                return Err(EvalError::Parse(format!(
                    "missing left operand in: {}",
                    input
                )));
            }
            let right = parse_literal(input[pos + op_str.len()..].trim())?;
            return Ok(Expression::Compare { left, op, right });
        }
    }

    // A bare state key reads as a boolean test
    if is_key_path(input) {
        return Ok(Expression::Compare {
            left: input.to_string(),
            op: CompareOp::Eq,
            right: Literal::Boolean(true),
        });
    }

    Err(EvalError::Parse(format!(
        "could not parse condition: {}",
        input
    )))
}

fn find_operator(input: &str, op: &str) -> Option<usize> {
    let mut in_string = false;

    for (i, c) in input.char_indices() {
        if c == '\'' || c == '"' {
            in_string = !in_string;
        } else if !in_string && input[i..].starts_with(op) {
            return Some(i);
        }
    }
    None
}

fn is_key_path(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !input.chars().next().unwrap_or('0').is_ascii_digit()
}

fn parse_literal(input: &str) -> Result<Literal, EvalError> {
    if input == "null" {
        return Ok(Literal::Null);
    }
    if input == "true" {
        return Ok(Literal::Boolean(true));
    }
    if input == "false" {
        return Ok(Literal::Boolean(false));
    }

    // String (single or double quotes)
    if input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')))
    {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    if let Ok(n) = input.parse::<f64>() {
        return Ok(Literal::Number(n));
    }

    Err(EvalError::Parse(format!("could not parse literal: {}", input)))
}
