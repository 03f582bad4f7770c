//! The actor resolver used by the server binary.
//!
//! The server has no user directory, so every actor gets the attribute set
//! configured under `actor_attributes`.

use async_trait::async_trait;
use enforcer_core::{
  Result,
  actor::{Actor, ActorResolver},
  env::Attributes,
};

/// Resolves every actor to the same configured attribute set.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
  attributes: Attributes,
}

impl StaticResolver {
  pub fn new(attributes: Attributes) -> Self { Self { attributes } }
}

#[async_trait]
impl ActorResolver for StaticResolver {
  async fn resolve(&self, actor_id: &str) -> Result<Actor> {
    let mut actor = Actor::new(actor_id);
    actor.validate()?;
    actor.attributes = self.attributes.clone();
    Ok(actor)
  }
}
