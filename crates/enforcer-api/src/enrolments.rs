//! Handlers for `/v1/actors/{actor_id}/...` endpoints.
//!
//! | Method | Path                                         | Notes |
//! |--------|----------------------------------------------|-------|
//! | `GET`  | `/v1/actors/{actor_id}/enrolments`           | `?status=ACTIVE,COMPLETED` lists stored ones only |
//! | `GET`  | `/v1/actors/{actor_id}/enrolments/{campaign}`| Stored or virtual |
//! | `POST` | `/v1/actors/{actor_id}/enrol`                | Body: `{"campaign_id":"..."}`; 201 if created |
//! | `POST` | `/v1/actors/{actor_id}/ingest`               | Body: `{"multi":false,"action":{...}}` |
//!
//! Enrolments are returned with their status as of the response.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use enforcer_core::{
  actor::Action,
  enrolment::{Enrolment, EnrolmentStatus, IngestResult},
  store::Store,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  campaigns::{ListParams, split_list},
  error::ApiError,
};

/// An enrolment plus its derived status.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnrolmentView {
  #[serde(flatten)]
  pub enrolment: Enrolment,
  pub status:    EnrolmentStatus,
}

impl From<Enrolment> for EnrolmentView {
  fn from(enrolment: Enrolment) -> Self {
    let status = enrolment.status();
    Self { enrolment, status }
  }
}

fn views(enrolments: Vec<Enrolment>) -> Json<Vec<EnrolmentView>> {
  Json(enrolments.into_iter().map(EnrolmentView::from).collect())
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EnrolmentParams {
  pub status:      Option<String>,
  pub only_active: Option<bool>,
  pub include:     Option<String>,
  pub search_in:   Option<String>,
  pub tags:        Option<String>,
}

/// `GET /v1/actors/{actor_id}/enrolments`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  Path(actor_id): Path<String>,
  params: Result<Query<EnrolmentParams>, QueryRejection>,
) -> Result<Json<Vec<EnrolmentView>>, ApiError> {
  let Query(params) = params?;

  if let Some(status) = params.status.as_deref() {
    let statuses = split_list(Some(status))
      .iter()
      .map(|s| s.parse())
      .collect::<Result<Vec<EnrolmentStatus>, _>>()?;
    let existing = state.engine.list_existing_enrolments(&actor_id, &statuses).await?;
    return Ok(views(existing));
  }

  let query = ListParams {
    only_active: params.only_active,
    include:     params.include,
    search_in:   params.search_in,
    tags:        params.tags,
  }
  .to_query();
  let actor = state.resolver.resolve(&actor_id).await?;
  Ok(views(state.engine.list_all_enrolments(&actor, &query).await?))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /v1/actors/{actor_id}/enrolments/{campaign_id}`
pub async fn get_one<S: Store>(
  State(state): State<AppState<S>>,
  Path((actor_id, campaign_id)): Path<(String, String)>,
) -> Result<Json<EnrolmentView>, ApiError> {
  let actor = state.resolver.resolve(&actor_id).await?;
  let enrolment = state.engine.get_enrolment(&campaign_id, &actor).await?;
  Ok(Json(enrolment.into()))
}

// ─── Enrol ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EnrolBody {
  pub campaign_id: String,
}

/// `POST /v1/actors/{actor_id}/enrol`
pub async fn enrol<S: Store>(
  State(state): State<AppState<S>>,
  Path(actor_id): Path<String>,
  body: Result<Json<EnrolBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let actor = state.resolver.resolve(&actor_id).await?;
  let (enrolment, created) = state.engine.enrol(&body.campaign_id, &actor).await?;
  let status = if created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(EnrolmentView::from(enrolment))))
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  #[serde(default)]
  pub multi:  bool,
  pub action: Action,
}

/// `POST /v1/actors/{actor_id}/ingest`
pub async fn ingest<S: Store>(
  State(state): State<AppState<S>>,
  Path(actor_id): Path<String>,
  body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<Vec<IngestResult>>, ApiError> {
  let Json(body) = body?;
  let actor = state.resolver.resolve(&actor_id).await?;
  let results = state.engine.ingest(&actor, body.action, body.multi).await?;
  Ok(Json(results))
}
