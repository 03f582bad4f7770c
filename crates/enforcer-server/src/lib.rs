//! HTTP host for the enrolment engine.
//!
//! Wraps the [`enforcer_api`] router with request tracing and request ids.
//! The binary in `main.rs` adds configuration, store selection and
//! shutdown handling.

pub mod config;
pub mod resolver;

use axum::{
  Router,
  body::Body,
  http::{HeaderName, HeaderValue, Request},
};
use enforcer_api::AppState;
use enforcer_core::store::Store;
use tower_http::{
  request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
  trace::TraceLayer,
};
use uuid::Uuid;

pub use config::{ServerConfig, StoreKind};
pub use resolver::StaticResolver;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a UUID v4 to requests that arrive without an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
  fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
    HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
  }
}

/// The full application: API routes plus tracing and request-id layers.
pub fn app<S: Store>(state: AppState<S>) -> Router {
  let header = HeaderName::from_static(REQUEST_ID_HEADER);

  // Layers wrap outward: the id is set first, then traced, then echoed.
  enforcer_api::api_router(state)
    .layer(PropagateRequestIdLayer::new(header.clone()))
    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
      let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
      tracing::info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        request_id,
      )
    }))
    .layer(SetRequestIdLayer::new(header, UuidRequestId))
}
