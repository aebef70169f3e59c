// SPDX-License-Identifier: MIT

//! Condition evaluation for graph routing
//!
//! This module provides parsing and evaluation of edge and loop conditions.
//! Conditions are simple expressions over execution state like:
//! - `intent == 'search'`
//! - `confidence > 0.8`
//! - `not done and attempts < 3`
//! - `(kind == 'bug' or kind == 'incident') && priority >= 2`
//!
//! Evaluation is fallible: a comparison against a state key that does not
//! exist is a typed error, never a silent false.

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;
