//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use enforcer_core::{ErrorKind, IngestError, enrolment::IngestResult};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] enforcer_core::Error),

  /// Ingestion failed after some steps were already committed.
  #[error("{source}")]
  Ingest {
    committed: Vec<IngestResult>,
    source:    enforcer_core::Error,
  },

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl From<IngestError> for ApiError {
  fn from(err: IngestError) -> Self {
    Self::Ingest { committed: err.committed, source: err.source }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

/// Ineligibility is a client-side condition, reported like bad input.
pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Invalid | ErrorKind::Ineligible => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (kind, committed) = match &self {
      ApiError::Core(err) => (err.kind(), None),
      ApiError::Ingest { source, committed } => (source.kind(), Some(committed)),
      ApiError::BadRequest(_) => (ErrorKind::Invalid, None),
    };
    let status = status_for(kind);
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    let mut body = json!({ "error": kind.code(), "message": self.to_string() });
    if let Some(committed) = committed {
      body["committed"] = json!(committed);
    }
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_map_to_statuses() {
    assert_eq!(status_for(ErrorKind::Invalid), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorKind::Ineligible), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
  }

  #[test]
  fn store_failures_are_500() {
    let err = ApiError::from(enforcer_core::Error::Store("disk full".into()));
    assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
