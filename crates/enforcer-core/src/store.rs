//! The `Store` trait and the campaign query predicate.
//!
//! The trait is implemented by storage backends (`enforcer-store-memory`,
//! `enforcer-store-sqlite`). The engine depends on this abstraction only.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{campaign::Campaign, enrolment::Enrolment};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Filters for campaign listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignQuery {
  /// Always returned, whether or not they match the other filters.
  #[serde(default)]
  pub include:     Vec<String>,
  /// Restrict to these ids; empty means no restriction.
  #[serde(default)]
  pub search_in:   Vec<String>,
  #[serde(default)]
  pub only_active: bool,
  /// Every campaign returned must carry all of these tags.
  #[serde(default)]
  pub having_tags: Vec<String>,
}

impl CampaignQuery {
  /// The filter predicate. `include` is not part of it; see
  /// [`CampaignQuery::admits`].
  pub fn matches(&self, campaign: &Campaign, now: DateTime<Utc>) -> bool {
    (!self.only_active || campaign.is_active(now))
      && (self.search_in.is_empty() || self.search_in.contains(&campaign.id))
      && campaign.has_tags(&self.having_tags)
  }

  /// `matches`, or listed in `include`.
  pub fn admits(&self, campaign: &Campaign, now: DateTime<Utc>) -> bool {
    self.include.contains(&campaign.id) || self.matches(campaign, now)
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistence for campaigns and enrolments.
///
/// Read-modify-write sequences (`update_campaign`, `update_enrolment`,
/// `upsert_enrolment`, `insert_enrolment`) must be atomic per key. The closures passed to the
/// update methods run inside that critical section; they must not block.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded runtime behind `axum`.
pub trait Store: Send + Sync + 'static {
  /// Backends surface core errors raised inside update closures unchanged.
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Campaigns ─────────────────────────────────────────────────────────

  fn get_campaign<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + 'a;

  /// All campaigns, unfiltered. The engine applies the predicate itself so
  /// that it behaves the same for every backend.
  fn list_campaigns<'a>(
    &'a self,
    query: &'a CampaignQuery,
  ) -> impl Future<Output = Result<Vec<Campaign>, Self::Error>> + Send + 'a;

  /// Fails with `Conflict` if the id is taken.
  fn create_campaign(
    &self,
    campaign: Campaign,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  /// Load, mutate with `f`, write back. Fails with `NotFound` if absent;
  /// nothing is written when `f` fails.
  fn update_campaign<'a, F>(
    &'a self,
    id: &'a str,
    f: F,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + 'a
  where
    F: FnOnce(&mut Campaign) -> crate::Result<()> + Send + 'static;

  /// Succeeds whether or not the campaign exists.
  fn delete_campaign<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Enrolments ────────────────────────────────────────────────────────

  fn get_enrolment<'a>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
  ) -> impl Future<Output = Result<Option<Enrolment>, Self::Error>> + Send + 'a;

  fn list_enrolments<'a>(
    &'a self,
    actor_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Enrolment>, Self::Error>> + Send + 'a;

  /// Create or replace. Returns `true` iff the record is new, in which case
  /// the campaign's `current_enrolments` is incremented in the same step.
  fn upsert_enrolment(
    &self,
    enrolment: Enrolment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Create the enrolment unless the pair already has one.
  ///
  /// An existing record is returned untouched together with `false`.
  /// Otherwise, in one critical section, the campaign's capacity is checked
  /// ([`Campaign::check_capacity`]), the record is written and
  /// `current_enrolments` is incremented. Fails with `NotFound` when the
  /// campaign does not exist.
  fn insert_enrolment(
    &self,
    enrolment: Enrolment,
  ) -> impl Future<Output = Result<(Enrolment, bool), Self::Error>> + Send + '_;

  /// Load the enrolment, run `f`, and write it back if `f` returns `true`.
  ///
  /// Returns the written record, or `None` when `f` declined. Fails with
  /// `NotFound` if absent.
  fn update_enrolment<'a, F>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
    f: F,
  ) -> impl Future<Output = Result<Option<Enrolment>, Self::Error>> + Send + 'a
  where
    F: FnOnce(&mut Enrolment) -> crate::Result<bool> + Send + 'static;
}
