//! The enrolment engine: the public API over a [`Store`] and a
//! [`RuleEvaluator`].
//!
//! The engine holds no mutable state of its own. Every enrolment mutation
//! goes through [`Store::update_enrolment`] or [`Store::insert_enrolment`],
//! so concurrent callers are serialised by the store, per key.

use std::{future::Future, sync::Arc};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  actor::{Action, Actor},
  campaign::{Campaign, CampaignUpdate, check_id},
  enrolment::{Enrolment, EnrolmentStatus, IngestResult},
  env::Env,
  rule::{self, RuleEvaluator},
  store::{CampaignQuery, Store},
};

/// An ingestion that stopped part-way. `committed` holds the steps that were
/// persisted before `source` occurred.
#[derive(Debug, Error)]
#[error("{source} ({} step(s) committed)", .committed.len())]
pub struct IngestError {
  pub committed: Vec<IngestResult>,
  pub source:    Error,
}

impl From<Error> for IngestError {
  fn from(source: Error) -> Self { Self { committed: Vec::new(), source } }
}

pub struct Engine<S> {
  store: Arc<S>,
  rules: Arc<dyn RuleEvaluator>,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), rules: Arc::clone(&self.rules) }
  }
}

impl<S: Store> Engine<S> {
  pub fn new(store: Arc<S>, rules: Arc<dyn RuleEvaluator>) -> Self { Self { store, rules } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ─── Campaigns ─────────────────────────────────────────────────────────────

  pub async fn get_campaign(&self, id: &str) -> Result<Campaign> {
    let id = check_id(id)?;
    self
      .store
      .get_campaign(id)
      .await
      .map_err(Into::into)?
      .ok_or_else(|| Error::NotFound(format!("campaign '{id}'")))
  }

  /// Campaigns admitted by `query`, in store order.
  pub async fn list_campaigns(&self, query: &CampaignQuery) -> Result<Vec<Campaign>> {
    let now = Utc::now();
    let all = self.store.list_campaigns(query).await.map_err(Into::into)?;
    Ok(all.into_iter().filter(|c| query.admits(c, now)).collect())
  }

  /// Validate and persist a new campaign. An empty id is replaced with a
  /// generated one; timestamps and the enrolment counter are reset.
  pub async fn create_campaign(&self, mut campaign: Campaign) -> Result<Campaign> {
    let now = Utc::now();
    if campaign.id.trim().is_empty() {
      campaign.id = format!("c{}", Uuid::new_v4().simple());
    }
    campaign.created_at = Some(now);
    campaign.updated_at = Some(now);
    campaign.current_enrolments = 0;
    campaign.validate(now)?;
    compile_rules(&*self.rules, &campaign)?;

    let created = self.store.create_campaign(campaign).await.map_err(Into::into)?;
    info!(campaign_id = %created.id, "campaign created");
    Ok(created)
  }

  pub async fn update_campaign(&self, id: &str, update: CampaignUpdate) -> Result<Campaign> {
    let id = check_id(id)?;
    let rules = Arc::clone(&self.rules);
    let updated = self
      .store
      .update_campaign(id, move |campaign| {
        let now = Utc::now();
        campaign.apply(&update, now)?;
        compile_rules(&*rules, campaign)?;
        campaign.updated_at = Some(now);
        Ok(())
      })
      .await
      .map_err(Into::into)?;
    info!(campaign_id = %updated.id, "campaign updated");
    Ok(updated)
  }

  pub async fn delete_campaign(&self, id: &str) -> Result<()> {
    let id = check_id(id)?;
    self.store.delete_campaign(id).await.map_err(Into::into)?;
    info!(campaign_id = %id, "campaign deleted");
    Ok(())
  }

  // ─── Enrolments ────────────────────────────────────────────────────────────

  /// The stored enrolment, or a virtual eligible one if there is none.
  pub async fn get_enrolment(&self, campaign_id: &str, actor: &Actor) -> Result<Enrolment> {
    let actor_id = actor_id(actor)?;
    let campaign_id = check_id(campaign_id)?;
    if let Some(existing) = self.load_enrolment(actor_id, campaign_id).await? {
      return Ok(existing);
    }

    let campaign = self.get_campaign(campaign_id).await?;
    self.check_eligibility(&campaign, actor)?;
    Ok(Enrolment::eligible(actor_id, &campaign))
  }

  /// Stored enrolments whose current status is in `statuses`; an empty
  /// filter returns all of them.
  ///
  /// The filter is copied up front so the returned future borrows nothing
  /// but `self` and `actor_id`, and stays `Send` when spawned.
  pub fn list_existing_enrolments<'a>(
    &'a self,
    actor_id: &'a str,
    statuses: &[EnrolmentStatus],
  ) -> impl Future<Output = Result<Vec<Enrolment>>> + Send + use<'a, S> {
    let statuses = statuses.to_vec();
    async move {
      let actor_id = actor_id.trim();
      if actor_id.is_empty() {
        return Err(Error::invalid("empty actor_id"));
      }
      self.stored_enrolments(actor_id, statuses).await
    }
  }

  /// Stored enrolments, followed by a virtual one for every active campaign
  /// matching `query` that the actor has no record for and is eligible for.
  pub async fn list_all_enrolments(
    &self,
    actor: &Actor,
    query: &CampaignQuery,
  ) -> Result<Vec<Enrolment>> {
    let actor_id = actor_id(actor)?;
    let mut all = self.stored_enrolments(actor_id, Vec::new()).await?;

    let query = CampaignQuery { only_active: true, ..query.clone() };
    let now = Utc::now();
    let campaigns = self.store.list_campaigns(&query).await.map_err(Into::into)?;

    for campaign in campaigns {
      if !query.matches(&campaign, now) || all.iter().any(|e| e.campaign_id == campaign.id) {
        continue;
      }
      match self.check_eligibility(&campaign, actor) {
        Ok(()) => all.push(Enrolment::eligible(actor_id, &campaign)),
        Err(Error::Ineligible(reason)) => {
          debug!(actor_id, campaign_id = %campaign.id, %reason, "skipping ineligible campaign");
        }
        Err(err) => return Err(err),
      }
    }
    Ok(all)
  }

  /// Enrol `actor` in the campaign. Returns the enrolment and whether it was
  /// created by this call; an existing record is returned unchanged.
  pub async fn enrol(&self, campaign_id: &str, actor: &Actor) -> Result<(Enrolment, bool)> {
    let actor_id = actor_id(actor)?;
    let campaign_id = check_id(campaign_id)?;
    if let Some(existing) = self.load_enrolment(actor_id, campaign_id).await? {
      return Ok((existing, false));
    }

    let campaign = self.get_campaign(campaign_id).await?;
    self.check_eligibility(&campaign, actor)?;

    let mut enrolment = Enrolment::eligible(actor_id, &campaign);
    enrolment.start(&campaign, Utc::now());
    let (enrolment, created) =
      self.store.insert_enrolment(enrolment).await.map_err(Into::into)?;
    if created {
      info!(actor_id, campaign_id, ends_at = ?enrolment.ends_at, "enrolled");
    } else {
      debug!(actor_id, campaign_id, "enrolled concurrently; keeping the stored record");
    }
    Ok((enrolment, created))
  }

  /// Feed an action to the actor's active enrolments.
  ///
  /// Each enrolment advances by at most one step. Without `complete_multi`
  /// processing stops at the first enrolment that advances.
  pub async fn ingest(
    &self,
    actor: &Actor,
    mut action: Action,
    complete_multi: bool,
  ) -> Result<Vec<IngestResult>, IngestError> {
    let actor_id = actor_id(actor)?;
    action.validate(actor_id, Utc::now())?;

    let enrolments = self.stored_enrolments(actor_id, vec![EnrolmentStatus::Active]).await?;
    let env = Env::for_action(actor, &action);

    let mut committed = Vec::new();
    for enrolment in enrolments {
      match self.advance(&enrolment, &action, &env).await {
        Ok(Some(result)) => {
          info!(
            actor_id,
            campaign_id = %result.campaign_id,
            step_id = result.step_id,
            action_id = %result.action_id,
            "step completed"
          );
          committed.push(result);
          if !complete_multi {
            break;
          }
        }
        Ok(None) => {}
        Err(source) => {
          warn!(
            actor_id,
            campaign_id = %enrolment.campaign_id,
            action_id = %action.id,
            committed = committed.len(),
            error = %source,
            "ingestion aborted"
          );
          return Err(IngestError { committed, source });
        }
      }
    }
    Ok(committed)
  }

  // ─── Internals ─────────────────────────────────────────────────────────────

  async fn stored_enrolments(
    &self,
    actor_id: &str,
    statuses: Vec<EnrolmentStatus>,
  ) -> Result<Vec<Enrolment>> {
    let now = Utc::now();
    let enrolments = self.store.list_enrolments(actor_id).await.map_err(Into::into)?;
    Ok(
      enrolments
        .into_iter()
        .filter(|e| statuses.is_empty() || statuses.contains(&e.status_at(now)))
        .collect(),
    )
  }

  async fn load_enrolment(&self, actor_id: &str, campaign_id: &str) -> Result<Option<Enrolment>> {
    self.store.get_enrolment(actor_id, campaign_id).await.map_err(Into::into)
  }

  /// Capacity first, then the eligibility rule.
  fn check_eligibility(&self, campaign: &Campaign, actor: &Actor) -> Result<()> {
    campaign.check_capacity()?;
    if campaign.eligibility.is_empty() {
      return Ok(());
    }
    if rule::check(&*self.rules, &campaign.eligibility, &Env::for_actor(actor))? {
      Ok(())
    } else {
      Err(Error::Ineligible(format!(
        "actor '{}' does not meet the eligibility rule of campaign '{}'",
        actor.id, campaign.id
      )))
    }
  }

  /// Attempt one step on `enrolment` inside the store's atomic update.
  fn advance<'a>(
    &'a self,
    enrolment: &'a Enrolment,
    action: &'a Action,
    env: &'a Env,
  ) -> impl Future<Output = Result<Option<IngestResult>>> + Send + 'a {
    async move {
      let campaign = match self.store.get_campaign(&enrolment.campaign_id).await.map_err(Into::into)? {
        Some(campaign) => campaign,
        None => {
          warn!(
            actor_id = %enrolment.actor_id,
            campaign_id = %enrolment.campaign_id,
            "enrolment refers to a deleted campaign"
          );
          return Ok(None);
        }
      };

      let rules = Arc::clone(&self.rules);
      let action = action.clone();
      let env = env.clone();
      let updated = self
        .store
        .update_enrolment(&enrolment.actor_id, &enrolment.campaign_id, move |current| {
          // Another request may have moved it on since it was listed.
          if current.status_at(Utc::now()) != EnrolmentStatus::Active {
            return Ok(false);
          }
          Ok(current.complete_step(&campaign, &action, &env, &*rules)?.is_some())
        })
        .await
        .map_err(Into::into)?;

      Ok(updated.and_then(|e| {
        e.completed_steps.last().map(|step| IngestResult {
          campaign_id: e.campaign_id.clone(),
          step_id:     step.step_id,
          action_id:   step.action_id.clone(),
        })
      }))
    }
  }
}

/// Reject rules the evaluator cannot parse, before they are stored.
fn compile_rules(rules: &dyn RuleEvaluator, campaign: &Campaign) -> Result<()> {
  if !campaign.eligibility.is_empty() {
    rules.compile(&campaign.eligibility).map_err(|e| {
      Error::invalid("eligibility rule does not compile").with_cause(e.to_string())
    })?;
  }
  for (i, step) in campaign.steps.iter().enumerate() {
    rules
      .compile(step)
      .map_err(|e| Error::invalid(format!("step rule {i} does not compile")).with_cause(e.to_string()))?;
  }
  Ok(())
}

fn actor_id(actor: &Actor) -> Result<&str> {
  let id = actor.id.trim();
  if id.is_empty() {
    return Err(Error::invalid("empty actor_id"));
  }
  Ok(id)
}
