//! JSON REST API for the enrolment engine.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`enforcer_core::store::Store`]. Actor attributes come from the
//! [`ActorResolver`] supplied by the host. Auth, TLS and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(enforcer_api::api_router(state))
//! ```

pub mod campaigns;
pub mod enrolments;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use enforcer_core::{Engine, actor::ActorResolver, store::Store};

pub use error::ApiError;

/// Shared handler state.
pub struct AppState<S> {
  pub engine:   Engine<S>,
  pub resolver: Arc<dyn ActorResolver>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { engine: self.engine.clone(), resolver: Arc::clone(&self.resolver) }
  }
}

impl<S: Store> AppState<S> {
  pub fn new(engine: Engine<S>, resolver: Arc<dyn ActorResolver>) -> Self {
    Self { engine, resolver }
  }
}

/// Build a fully-materialised API router.
///
/// Everything except `/ping` lives under `/v1`. The returned `Router<()>`
/// can be merged into any parent router regardless of its own state type.
pub fn api_router<S: Store>(state: AppState<S>) -> Router<()> {
  let v1 = Router::new()
    // Campaigns
    .route("/campaigns", get(campaigns::list::<S>).post(campaigns::create::<S>))
    .route(
      "/campaigns/{id}",
      get(campaigns::get_one::<S>)
        .patch(campaigns::update_one::<S>)
        .delete(campaigns::delete_one::<S>),
    )
    // Enrolments
    .route("/actors/{actor_id}/enrolments", get(enrolments::list::<S>))
    .route("/actors/{actor_id}/enrolments/{campaign_id}", get(enrolments::get_one::<S>))
    .route("/actors/{actor_id}/enrol", post(enrolments::enrol::<S>))
    .route("/actors/{actor_id}/ingest", post(enrolments::ingest::<S>));

  Router::new()
    .route("/ping", get(|| async { "pong" }))
    .nest("/v1", v1)
    .with_state(state)
}
