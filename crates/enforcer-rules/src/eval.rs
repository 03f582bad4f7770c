//! Tree-walking evaluation against an [`Env`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use enforcer_core::env::{Env, Value};
use regex::Regex;

use crate::{
  error::{Error, Result},
  parse::{BinaryOp, Expr},
};

pub fn eval(expr: &Expr, env: &Env) -> Result<Value> {
  match expr {
    Expr::Literal(value) => Ok(value.clone()),
    Expr::Path(path) => Ok(env.lookup(path).cloned().unwrap_or(Value::Null)),
    Expr::List(items) => {
      items.iter().map(|item| eval(item, env)).collect::<Result<_>>().map(Value::List)
    }
    Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.is_truthy())),
    Expr::And(lhs, rhs) => {
      Ok(Value::Bool(eval(lhs, env)?.is_truthy() && eval(rhs, env)?.is_truthy()))
    }
    Expr::Or(lhs, rhs) => {
      Ok(Value::Bool(eval(lhs, env)?.is_truthy() || eval(rhs, env)?.is_truthy()))
    }
    Expr::Binary { op, lhs, rhs } => {
      let lhs = eval(lhs, env)?;
      let rhs = eval(rhs, env)?;
      binary(*op, &lhs, &rhs).map(Value::Bool)
    }
  }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<bool> {
  match op {
    BinaryOp::Eq => Ok(equals(lhs, rhs)),
    BinaryOp::Ne => Ok(!equals(lhs, rhs)),
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
      Ok(compare(op, lhs, rhs)?.is_some_and(|ord| match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
      }))
    }
    BinaryOp::In => member(op, lhs, rhs),
    BinaryOp::NotIn => member(op, lhs, rhs).map(|found| !found),
    BinaryOp::Contains => member(op, rhs, lhs),
    BinaryOp::StartsWith => strings(op, lhs, rhs, |s, prefix| Ok(s.starts_with(prefix))),
    BinaryOp::EndsWith => strings(op, lhs, rhs, |s, suffix| Ok(s.ends_with(suffix))),
    BinaryOp::Matches => {
      strings(op, lhs, rhs, |s, pattern| Ok(Regex::new(pattern)?.is_match(s)))
    }
  }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> Error {
  Error::TypeMismatch { op: op.symbol(), left: lhs.type_name(), right: rhs.type_name() }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Structural equality; a string equals a timestamp when it parses to the
/// same instant. Values of different types are unequal.
fn equals(lhs: &Value, rhs: &Value) -> bool {
  match (lhs, rhs) {
    (Value::Timestamp(t), Value::String(s)) | (Value::String(s), Value::Timestamp(t)) => {
      parse_time(s).is_some_and(|parsed| parsed == *t)
    }
    _ => lhs == rhs,
  }
}

/// `None` when either side is null.
fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Option<Ordering>> {
  let timestamp = |s: &str| parse_time(s).ok_or_else(|| Error::InvalidTimestamp(s.to_owned()));
  Ok(match (lhs, rhs) {
    (Value::Null, _) | (_, Value::Null) => None,
    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
    (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
    (Value::Timestamp(a), Value::String(b)) => Some(a.cmp(&timestamp(b)?)),
    (Value::String(a), Value::Timestamp(b)) => Some(timestamp(a)?.cmp(b)),
    _ => return Err(mismatch(op, lhs, rhs)),
  })
}

/// Whether `needle` is an element of the list, or a substring of the string,
/// `haystack`. A null haystack contains nothing.
fn member(op: BinaryOp, needle: &Value, haystack: &Value) -> Result<bool> {
  match (needle, haystack) {
    (_, Value::Null) => Ok(false),
    (_, Value::List(items)) => Ok(items.iter().any(|item| equals(needle, item))),
    (Value::Null, Value::String(_)) => Ok(false),
    (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
    _ => Err(mismatch(op, needle, haystack)),
  }
}

fn strings(
  op: BinaryOp,
  lhs: &Value,
  rhs: &Value,
  f: impl FnOnce(&str, &str) -> Result<bool>,
) -> Result<bool> {
  match (lhs, rhs) {
    (Value::Null, _) | (_, Value::Null) => Ok(false),
    (Value::String(a), Value::String(b)) => f(a, b),
    _ => Err(mismatch(op, lhs, rhs)),
  }
}
