//! The evaluation environment handed to a [`RuleEvaluator`].
//!
//! Rules see a closed set of named sections (`actor` and `event`), each an
//! ordered map of small, explicitly-typed values. This module is the only
//! place where dynamically-typed data enters the engine.
//!
//! [`RuleEvaluator`]: crate::rule::RuleEvaluator

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::{Action, Actor};

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single attribute or event-data value.
///
/// Deserialised from plain JSON. Strings that parse as RFC 3339 timestamps
/// become [`Value::Timestamp`]; variant order below is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Bool(bool),
  Number(f64),
  Timestamp(DateTime<Utc>),
  String(String),
  List(Vec<Value>),
}

impl Value {
  /// `bool` values as-is, `null` is false, anything else is true.
  pub fn is_truthy(&self) -> bool {
    match self {
      Self::Bool(b) => *b,
      Self::Null => false,
      _ => true,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Bool(_) => "bool",
      Self::Number(_) => "number",
      Self::Timestamp(_) => "timestamp",
      Self::String(_) => "string",
      Self::List(_) => "list",
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Self::Number(n as f64) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::String(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::String(s) }
}

impl From<DateTime<Utc>> for Value {
  fn from(t: DateTime<Utc>) -> Self { Self::Timestamp(t) }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
  fn from(items: Vec<T>) -> Self {
    Self::List(items.into_iter().map(Into::into).collect())
  }
}

/// An ordered mapping from attribute name to value.
pub type Attributes = BTreeMap<String, Value>;

// ─── Env ─────────────────────────────────────────────────────────────────────

/// The data a rule is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Env {
  pub actor: Attributes,
  /// Empty when evaluating eligibility, which happens outside any action.
  pub event: Attributes,
}

impl Env {
  /// Environment for eligibility checks: actor attributes plus `actor.id`.
  pub fn for_actor(actor: &Actor) -> Self {
    Self { actor: actor_section(actor), event: Attributes::new() }
  }

  /// Environment for step rules. The synthetic `event.id` and `event.time`
  /// always override keys of the same name in the action data.
  pub fn for_action(actor: &Actor, action: &Action) -> Self {
    let mut event = action.data.clone();
    event.insert("id".to_owned(), Value::String(action.id.clone()));
    if let Some(time) = action.time {
      event.insert("time".to_owned(), Value::Timestamp(time));
    }
    Self { actor: actor_section(actor), event }
  }

  /// Resolve a dotted path such as `actor.segments` or `event.kind`.
  ///
  /// Returns `None` for unknown sections and missing keys. Paths deeper than
  /// two segments never resolve since sections hold flat values.
  pub fn lookup(&self, path: &str) -> Option<&Value> {
    let (section, key) = path.split_once('.')?;
    let attrs = match section {
      "actor" => &self.actor,
      "event" => &self.event,
      _ => return None,
    };
    attrs.get(key)
  }
}

fn actor_section(actor: &Actor) -> Attributes {
  let mut attrs = actor.attributes.clone();
  attrs.insert("id".to_owned(), Value::String(actor.id.clone()));
  attrs
}
