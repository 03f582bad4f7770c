//! Handlers for `/v1/campaigns` endpoints.
//!
//! | Method   | Path                  | Notes |
//! |----------|-----------------------|-------|
//! | `GET`    | `/v1/campaigns`       | `?only_active=true&include=a,b&search_in=a,b&tags=x,y` |
//! | `POST`   | `/v1/campaigns`       | Body: a campaign; empty `id` is assigned |
//! | `GET`    | `/v1/campaigns/{id}`  | 404 if not found |
//! | `PATCH`  | `/v1/campaigns/{id}`  | Body: partial update; tags take `+`/`-` prefixes |
//! | `DELETE` | `/v1/campaigns/{id}`  | 204, also when absent |

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
  campaign::{Campaign, CampaignUpdate},
  store::{CampaignQuery, Store},
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

/// Campaign filters shared by campaign and enrolment listings. List values
/// are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub only_active: Option<bool>,
  pub include:     Option<String>,
  pub search_in:   Option<String>,
  pub tags:        Option<String>,
}

impl ListParams {
  pub fn to_query(&self) -> CampaignQuery {
    CampaignQuery {
      include:     split_list(self.include.as_deref()),
      search_in:   split_list(self.search_in.as_deref()),
      only_active: self.only_active.unwrap_or(false),
      having_tags: split_list(self.tags.as_deref()),
    }
  }
}

pub(crate) fn split_list(s: Option<&str>) -> Vec<String> {
  s.map(|s| {
    s.split(',')
      .map(str::trim)
      .filter(|item| !item.is_empty())
      .map(str::to_owned)
      .collect()
  })
  .unwrap_or_default()
}

/// `GET /v1/campaigns`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
  let Query(params) = params?;
  let campaigns = state.engine.list_campaigns(&params.to_query()).await?;
  Ok(Json(campaigns))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /v1/campaigns`
pub async fn create<S: Store>(
  State(state): State<AppState<S>>,
  body: Result<Json<Campaign>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(campaign) = body?;
  let created = state.engine.create_campaign(campaign).await?;
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /v1/campaigns/{id}`
pub async fn get_one<S: Store>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
  Ok(Json(state.engine.get_campaign(&id).await?))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PATCH /v1/campaigns/{id}`
pub async fn update_one<S: Store>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  body: Result<Json<CampaignUpdate>, JsonRejection>,
) -> Result<Json<Campaign>, ApiError> {
  let Json(update) = body?;
  Ok(Json(state.engine.update_campaign(&id, update).await?))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /v1/campaigns/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.engine.delete_campaign(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn list_params_split_on_commas() {
    let params = ListParams {
      only_active: Some(true),
      include:     Some("a, b,,".into()),
      search_in:   None,
      tags:        Some("promo".into()),
    };
    let query = params.to_query();
    assert_eq!(query.include, vec!["a", "b"]);
    assert!(query.search_in.is_empty());
    assert_eq!(query.having_tags, vec!["promo"]);
    assert!(query.only_active);
  }
}
