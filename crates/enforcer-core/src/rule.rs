//! The contract the engine requires from a rule evaluator.

use crate::env::Env;

/// Error type returned by evaluators; wrapped into [`crate::Error::Rule`]
/// together with the offending rule text.
pub type RuleError = Box<dyn std::error::Error + Send + Sync>;

/// Executes an opaque rule expression against an [`Env`].
///
/// Implementations must tolerate concurrent calls. An evaluator whose runtime
/// is not reentrant serialises internally; the engine never does it for them.
pub trait RuleEvaluator: Send + Sync {
  /// Evaluate `rule` and reduce the result to pass/fail.
  ///
  /// A rule that evaluates to false is `Ok(false)`; `Err` is reserved for
  /// rules that cannot be evaluated at all.
  fn exec(&self, rule: &str, env: &Env) -> Result<bool, RuleError>;

  /// Check that `rule` is well-formed without evaluating it. Evaluators
  /// that cannot tell accept everything.
  fn compile(&self, rule: &str) -> Result<(), RuleError> {
    let _ = rule;
    Ok(())
  }
}

impl<T: RuleEvaluator + ?Sized> RuleEvaluator for std::sync::Arc<T> {
  fn exec(&self, rule: &str, env: &Env) -> Result<bool, RuleError> {
    (**self).exec(rule, env)
  }

  fn compile(&self, rule: &str) -> Result<(), RuleError> { (**self).compile(rule) }
}

/// Run `rule` and annotate failures with the rule text.
pub(crate) fn check(
  evaluator: &dyn RuleEvaluator,
  rule: &str,
  env: &Env,
) -> crate::Result<bool> {
  evaluator
    .exec(rule, env)
    .map_err(|source| crate::Error::Rule { rule: rule.to_owned(), source })
}
