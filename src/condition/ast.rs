// SPDX-License-Identifier: MIT

//! Parsed form of edge condition expressions
//!
//! The parser produces these trees once at build time; the evaluator walks
//! them against live state on every routing decision. A `Compare` left-hand
//! side is always a state key path, never a literal.

/// Constant operands appearing on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

/// Binary comparison operators
#[derive(Debug, Clone, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring test on strings, membership test on arrays
    Contains,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

/// A boolean expression over workflow state
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        /// State key path, dot-separated for nested access
        left: String,
        op: CompareOp,
        right: Literal,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    True,
    False,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols() {
        let cases = [
            (CompareOp::Eq, "=="),
            (CompareOp::NotEq, "!="),
            (CompareOp::Gt, ">"),
            (CompareOp::Gte, ">="),
            (CompareOp::Lt, "<"),
            (CompareOp::Lte, "<="),
            (CompareOp::Contains, "contains"),
        ];
        for (op, symbol) in cases {
            assert_eq!(op.to_string(), symbol);
        }
    }

    #[test]
    fn test_structural_equality_of_nested_expressions() {
        let make = || {
            Expression::And(
                Box::new(Expression::Compare {
                    left: "score".to_string(),
                    op: CompareOp::Gte,
                    right: Literal::Number(0.5),
                }),
                Box::new(Expression::Not(Box::new(Expression::False))),
            )
        };
        assert_eq!(make(), make());
    }
}
