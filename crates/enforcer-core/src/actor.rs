//! Actors and the actions they perform.
//!
//! Neither has a persistent lifecycle of its own. Actors are hydrated per
//! request by an [`ActorResolver`] supplied by the hosting application;
//! actions arrive through ingestion and are immutable once validated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, env::Attributes};

// ─── Actor ───────────────────────────────────────────────────────────────────

/// An entity performing actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
  pub id:         String,
  /// Open attribute map used as rule-evaluation context.
  #[serde(default)]
  pub attributes: Attributes,
}

impl Actor {
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), attributes: Attributes::new() }
  }

  /// Trim the identifier and reject empty ones.
  pub fn validate(&mut self) -> Result<()> {
    self.id = self.id.trim().to_owned();
    if self.id.is_empty() {
      return Err(Error::invalid("empty actor_id"));
    }
    Ok(())
  }
}

/// Looks up the attributes of an actor before any engine call that needs
/// eligibility context.
#[async_trait]
pub trait ActorResolver: Send + Sync {
  async fn resolve(&self, actor_id: &str) -> Result<Actor>;
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// An observed event submitted for ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
  /// Caller-assigned, unique per submission.
  pub id:       String,
  /// Defaults to the current time during validation.
  #[serde(default)]
  pub time:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub actor_id: String,
  /// Open data map passed into step rules as the `event` section.
  #[serde(default)]
  pub data:     Attributes,
}

impl Action {
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), ..Self::default() }
  }

  /// Normalise the action and check it belongs to `actor_id`.
  ///
  /// An empty `actor_id` is filled in; a different one is rejected.
  pub fn validate(&mut self, actor_id: &str, now: DateTime<Utc>) -> Result<()> {
    self.id = self.id.trim().to_owned();
    if self.id.is_empty() {
      return Err(Error::invalid("empty action_id"));
    }

    self.actor_id = self.actor_id.trim().to_owned();
    if self.actor_id.is_empty() {
      self.actor_id = actor_id.to_owned();
    } else if self.actor_id != actor_id {
      return Err(
        Error::invalid("action belongs to a different actor")
          .with_cause(format!("'{}' != '{actor_id}'", self.actor_id)),
      );
    }

    if self.time.is_none() {
      self.time = Some(now);
    }
    Ok(())
  }

  /// The action timestamp. Only meaningful after [`Action::validate`].
  pub fn timestamp(&self) -> DateTime<Utc> { self.time.unwrap_or_default() }
}
