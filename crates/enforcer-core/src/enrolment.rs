//! Enrolments and step progression.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  actor::Action,
  campaign::Campaign,
  env::Env,
  rule::{self, RuleEvaluator},
};

/// Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrolmentStatus {
  Eligible,
  Active,
  Completed,
  Expired,
}

impl EnrolmentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Eligible => "ELIGIBLE",
      Self::Active => "ACTIVE",
      Self::Completed => "COMPLETED",
      Self::Expired => "EXPIRED",
    }
  }
}

impl fmt::Display for EnrolmentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EnrolmentStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "ELIGIBLE" => Ok(Self::Eligible),
      "ACTIVE" => Ok(Self::Active),
      "COMPLETED" => Ok(Self::Completed),
      "EXPIRED" => Ok(Self::Expired),
      other => Err(Error::invalid(format!("unknown enrolment status '{other}'"))),
    }
  }
}

/// One satisfied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
  /// Index into the campaign's step sequence.
  pub step_id:   usize,
  pub action_id: String,
  /// The action's timestamp, not the time it was processed.
  pub done_at:   DateTime<Utc>,
}

/// Binds one actor to one campaign.
///
/// `remaining_steps` is kept alongside `completed_steps` for readers, but is
/// only ever written by [`Enrolment::eligible`] and the private append path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrolment {
  pub actor_id:        String,
  pub campaign_id:     String,
  /// Unset for virtual enrolments.
  pub started_at:      Option<DateTime<Utc>>,
  pub ends_at:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub completed_steps: Vec<StepResult>,
  #[serde(default)]
  pub remaining_steps: usize,
}

impl Enrolment {
  /// The virtual, not yet persisted projection of an eligible actor.
  pub fn eligible(actor_id: &str, campaign: &Campaign) -> Self {
    Self {
      actor_id:        actor_id.to_owned(),
      campaign_id:     campaign.id.clone(),
      started_at:      None,
      ends_at:         None,
      completed_steps: Vec::new(),
      remaining_steps: campaign.steps.len(),
    }
  }

  /// Turn a virtual enrolment into a real one starting at `now`.
  pub fn start(&mut self, campaign: &Campaign, now: DateTime<Utc>) {
    self.started_at = Some(now);
    self.ends_at = if campaign.deadline > 0 {
      Some(now + Duration::days(i64::from(campaign.deadline)))
    } else {
      campaign.end_at
    };
  }

  /// Status at `now`. A finished enrolment stays `COMPLETED` past its expiry.
  pub fn status_at(&self, now: DateTime<Utc>) -> EnrolmentStatus {
    if self.started_at.is_none() {
      return EnrolmentStatus::Eligible;
    }
    if self.remaining_steps == 0 {
      return EnrolmentStatus::Completed;
    }
    match self.ends_at {
      Some(ends_at) if ends_at < now => EnrolmentStatus::Expired,
      _ => EnrolmentStatus::Active,
    }
  }

  pub fn status(&self) -> EnrolmentStatus { self.status_at(Utc::now()) }

  pub fn is_virtual(&self) -> bool { self.started_at.is_none() }

  /// Try to satisfy one step of `campaign` with `action`.
  ///
  /// Returns the appended result, or `None` when no rule passed. A rule that
  /// fails to evaluate leaves the enrolment untouched and is returned as an
  /// error.
  pub fn complete_step(
    &mut self,
    campaign: &Campaign,
    action: &Action,
    env: &Env,
    evaluator: &dyn RuleEvaluator,
  ) -> Result<Option<StepResult>> {
    let step_id = if campaign.is_unordered {
      self.next_unordered(campaign, env, evaluator)?
    } else {
      self.next_ordered(campaign, env, evaluator)?
    };

    Ok(step_id.map(|step_id| {
      let result = StepResult {
        step_id,
        action_id: action.id.clone(),
        done_at: action.timestamp(),
      };
      self.record_step(result.clone(), campaign.steps.len());
      result
    }))
  }

  fn next_ordered(
    &self,
    campaign: &Campaign,
    env: &Env,
    evaluator: &dyn RuleEvaluator,
  ) -> Result<Option<usize>> {
    let index = self.completed_steps.len();
    let Some(rule) = campaign.steps.get(index) else {
      return Err(Error::Internal(format!(
        "enrolment {}/{} has {} completed steps but campaign defines {}",
        self.actor_id,
        self.campaign_id,
        index,
        campaign.steps.len()
      )));
    };
    // Guards against history left over from a switch to ordered mode.
    if self.completed_steps.iter().any(|s| s.step_id == index) {
      return Err(Error::Internal(format!(
        "enrolment {}/{} already completed step {index}",
        self.actor_id, self.campaign_id
      )));
    }

    Ok(rule::check(evaluator, rule, env)?.then_some(index))
  }

  fn next_unordered(
    &self,
    campaign: &Campaign,
    env: &Env,
    evaluator: &dyn RuleEvaluator,
  ) -> Result<Option<usize>> {
    let done: BTreeSet<usize> = self.completed_steps.iter().map(|s| s.step_id).collect();
    for (index, rule) in campaign.steps.iter().enumerate() {
      if done.contains(&index) {
        continue;
      }
      if rule::check(evaluator, rule, env)? {
        return Ok(Some(index));
      }
    }
    Ok(None)
  }

  fn record_step(&mut self, result: StepResult, total_steps: usize) {
    self.completed_steps.push(result);
    self.remaining_steps = total_steps.saturating_sub(self.completed_steps.len());
  }
}

/// One enrolment advanced by an ingested action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
  pub campaign_id: String,
  pub step_id:     usize,
  pub action_id:   String,
}
