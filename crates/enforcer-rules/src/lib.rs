//! A small boolean expression language for campaign rules.
//!
//! ```text
//! actor.tier in ['gold', 'platinum'] && event.amount >= 100
//! event.kind == 'checkout' and not (event.coupon startsWith 'STAFF')
//! ```
//!
//! Rules are parsed and evaluated on every call; the evaluator keeps no
//! state between calls, so it is freely shareable across threads.

pub mod error;
pub mod eval;
pub mod parse;

use enforcer_core::{
  env::{Env, Value},
  rule::{RuleError, RuleEvaluator},
};

pub use error::{Error, Result};

/// Parse and evaluate `rule`, returning the raw result value.
pub fn evaluate(rule: &str, env: &Env) -> Result<Value> {
  eval::eval(&parse::parse(rule)?, env)
}

/// The default [`RuleEvaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl RuleEvaluator for ExprEvaluator {
  fn exec(&self, rule: &str, env: &Env) -> Result<bool, RuleError> {
    Ok(evaluate(rule, env)?.is_truthy())
  }

  fn compile(&self, rule: &str) -> Result<(), RuleError> {
    parse::parse(rule)?;
    Ok(())
  }
}
