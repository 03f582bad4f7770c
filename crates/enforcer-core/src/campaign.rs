//! Campaign definitions.
//!
//! A campaign is a time-bounded program of gating rules. Definitions are
//! validated on insert and only ever mutated through [`Campaign::apply`],
//! which re-validates the merged result and refuses structural edits while
//! the campaign is in use.

use std::{collections::BTreeSet, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pattern every campaign identifier must match.
pub const ID_PATTERN: &str = "^[A-Za-z][A-Za-z0-9_]+$";

static ID_REGEX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(ID_PATTERN).expect("ID_PATTERN is a valid regex"));

/// Trim `id` and check it against [`ID_PATTERN`].
pub fn check_id(id: &str) -> Result<&str> {
  let id = id.trim();
  if !ID_REGEX.is_match(id) {
    return Err(
      Error::invalid(format!("invalid campaign id '{id}'"))
        .with_cause(format!("must match '{ID_PATTERN}'")),
    );
  }
  Ok(id)
}

// ─── Campaign ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
  #[serde(default)]
  pub id:                 String,
  /// Matched as a set; order and duplicates carry no meaning.
  #[serde(default)]
  pub tags:               BTreeSet<String>,
  #[serde(default)]
  pub description:        String,
  #[serde(default)]
  pub enabled:            bool,
  pub start_at:           Option<DateTime<Utc>>,
  pub end_at:             Option<DateTime<Utc>>,
  /// Step rules. A step is identified by its position, in both modes.
  #[serde(default)]
  pub steps:              Vec<String>,
  #[serde(default)]
  pub is_unordered:       bool,
  /// Empty means every actor is eligible.
  #[serde(default)]
  pub eligibility:        String,
  /// Days an enrolment stays open after it starts; 0 means until `end_at`.
  #[serde(default)]
  pub deadline:           i32,
  #[serde(default)]
  pub priority:           i32,
  /// 0 means unlimited.
  #[serde(default)]
  pub max_enrolments:     u32,
  #[serde(default)]
  pub current_enrolments: u32,
  pub created_at:         Option<DateTime<Utc>>,
  pub updated_at:         Option<DateTime<Utc>>,
}

impl Campaign {
  /// Normalise the definition and enforce every invariant, failing on the
  /// first violated one.
  pub fn validate(&mut self, now: DateTime<Utc>) -> Result<()> {
    self.id = self.id.trim().to_owned();
    self.tags = clean_tags(std::mem::take(&mut self.tags));
    self.eligibility = self.eligibility.trim().to_owned();
    self.description = self.description.trim().to_owned();
    let created_at = *self.created_at.get_or_insert(now);
    self.updated_at.get_or_insert(created_at);

    check_id(&self.id)?;

    let Some(start_at) = self.start_at else {
      return Err(Error::invalid("start_at must be set"));
    };
    let Some(end_at) = self.end_at else {
      return Err(Error::invalid("end_at must be set"));
    };
    if end_at <= start_at {
      return Err(Error::invalid("end_at must be after start_at"));
    }
    if end_at <= now {
      return Err(Error::invalid("end_at must be in the future"));
    }

    if self.eligibility.is_empty() && self.steps.is_empty() {
      return Err(Error::invalid("at least one of eligibility or steps must be specified"));
    }
    for (i, step) in self.steps.iter_mut().enumerate() {
      *step = step.trim().to_owned();
      if step.is_empty() {
        return Err(Error::invalid(format!("step rule {i} must not be empty")));
      }
    }

    if self.deadline < 0 {
      return Err(Error::invalid("deadline must be 0 or positive"));
    }
    if !(0..=100).contains(&self.priority) {
      return Err(Error::invalid("priority must be in range [0, 100]"));
    }
    Ok(())
  }

  /// Enabled, and `at` falls strictly inside the scheduling window.
  pub fn is_active(&self, at: DateTime<Utc>) -> bool {
    match (self.start_at, self.end_at) {
      (Some(start), Some(end)) => self.enabled && start < at && at < end,
      _ => false,
    }
  }

  /// Active with at least one enrolment; structural fields are then frozen.
  pub fn is_in_use(&self, at: DateTime<Utc>) -> bool {
    self.is_active(at) && self.current_enrolments > 0
  }

  /// True iff every tag in `required` is present. Empty `required` matches.
  pub fn has_tags<S: AsRef<str>>(&self, required: &[S]) -> bool {
    required.iter().all(|t| self.tags.contains(t.as_ref()))
  }

  /// Merge a partial update and re-validate the result.
  ///
  /// On error `self` is left untouched.
  pub fn apply(&mut self, update: &CampaignUpdate, now: DateTime<Utc>) -> Result<()> {
    let in_use = self.is_in_use(now);
    let frozen = |what: &str| {
      Error::invalid(format!("{what} cannot be modified"))
        .with_cause(format!("{} active enrolments", self.current_enrolments))
    };

    let mut next = self.clone();

    if let Some(enabled) = update.enabled {
      next.enabled = enabled;
    }
    if let Some(start_at) = update.start_at
      && next.start_at != Some(start_at)
    {
      if in_use {
        return Err(frozen("start_at"));
      }
      next.start_at = Some(start_at);
    }
    if let Some(end_at) = update.end_at
      && next.end_at != Some(end_at)
    {
      if in_use {
        return Err(frozen("end_at"));
      }
      next.end_at = Some(end_at);
    }

    apply_tag_ops(&mut next.tags, &update.tags);

    if let Some(is_unordered) = update.is_unordered {
      next.is_unordered = is_unordered;
    }
    if let Some(priority) = update.priority {
      next.priority = priority;
    }
    if let Some(description) = &update.description {
      next.description = description.clone();
    }

    if let Some(deadline) = update.deadline
      && next.deadline != deadline
    {
      if in_use {
        return Err(frozen("deadline"));
      }
      next.deadline = deadline;
    }
    if let Some(eligibility) = &update.eligibility
      && next.eligibility != eligibility.trim()
    {
      if in_use {
        return Err(frozen("eligibility"));
      }
      next.eligibility = eligibility.clone();
    }
    if let Some(steps) = &update.steps
      && !same_steps(&next.steps, steps)
    {
      if in_use {
        return Err(frozen("steps"));
      }
      next.steps = steps.clone();
    }

    if let Some(max) = update.max_enrolments {
      if max > 0 && max < next.current_enrolments {
        return Err(
          Error::invalid("max_enrolments cannot be lowered below current enrolments")
            .with_cause(format!("{} active enrolments", next.current_enrolments)),
        );
      }
      next.max_enrolments = max;
    }

    next.validate(now)?;
    *self = next;
    Ok(())
  }

  /// Whether the capacity gate still admits one more enrolment.
  pub fn has_capacity(&self) -> bool {
    self.max_enrolments == 0 || self.current_enrolments < self.max_enrolments
  }

  /// [`Campaign::has_capacity`] as an `Ineligible` error. Stores call this
  /// in the same critical section that increments the counter.
  pub fn check_capacity(&self) -> Result<()> {
    if self.has_capacity() {
      Ok(())
    } else {
      Err(Error::Ineligible(format!(
        "campaign '{}' is already at maximum enrolments ({})",
        self.id, self.max_enrolments
      )))
    }
  }
}

// ─── CampaignUpdate ──────────────────────────────────────────────────────────

/// A partial update; absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignUpdate {
  /// `+tag` adds, `-tag` removes, a bare tag adds.
  #[serde(default)]
  pub tags:           Vec<String>,
  pub start_at:       Option<DateTime<Utc>>,
  pub end_at:         Option<DateTime<Utc>>,
  pub enabled:        Option<bool>,
  pub steps:          Option<Vec<String>>,
  pub deadline:       Option<i32>,
  pub priority:       Option<i32>,
  pub is_unordered:   Option<bool>,
  pub eligibility:    Option<String>,
  pub max_enrolments: Option<u32>,
  pub description:    Option<String>,
}

fn clean_tags(tags: BTreeSet<String>) -> BTreeSet<String> {
  tags
    .into_iter()
    .map(|t| t.trim().to_owned())
    .filter(|t| !t.is_empty())
    .collect()
}

fn apply_tag_ops(tags: &mut BTreeSet<String>, ops: &[String]) {
  for op in ops {
    let op = op.trim();
    if let Some(tag) = op.strip_prefix('-') {
      tags.remove(tag.trim());
    } else {
      let tag = op.strip_prefix('+').unwrap_or(op).trim();
      if !tag.is_empty() {
        tags.insert(tag.to_owned());
      }
    }
  }
}

fn same_steps(current: &[String], proposed: &[String]) -> bool {
  current.len() == proposed.len()
    && current.iter().zip(proposed).all(|(a, b)| a == b.trim())
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

  fn sample() -> Campaign {
    Campaign {
      id: "summer_quest".into(),
      enabled: true,
      start_at: Some(now() - Duration::days(1)),
      end_at: Some(now() + Duration::days(30)),
      steps: vec!["event.kind == 'a'".into(), "event.kind == 'b'".into()],
      ..Campaign::default()
    }
  }

  fn in_use() -> Campaign {
    let mut c = sample();
    c.current_enrolments = 2;
    c.validate(now()).unwrap();
    c
  }

  // ── validate ──────────────────────────────────────────────────────────────

  #[test]
  fn validate_normalises() {
    let mut c = sample();
    c.id = "  summer_quest ".into();
    c.eligibility = "  actor.tier == 'gold' ".into();
    c.steps = vec![" event.kind == 'a' ".into()];
    c.tags = [" promo", "promo", "", "vip "].into_iter().map(String::from).collect();

    c.validate(now()).unwrap();

    assert_eq!(c.id, "summer_quest");
    assert_eq!(c.eligibility, "actor.tier == 'gold'");
    assert_eq!(c.steps, vec!["event.kind == 'a'"]);
    assert_eq!(c.tags.iter().collect::<Vec<_>>(), vec!["promo", "vip"]);
    assert_eq!(c.created_at, Some(now()));
    assert_eq!(c.updated_at, Some(now()));
  }

  #[test]
  fn validate_is_idempotent() {
    let mut once = sample();
    once.tags.insert(" x ".into());
    once.validate(now()).unwrap();

    let mut twice = once.clone();
    twice.validate(now() + Duration::hours(1)).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn validate_rejects_each_invariant() {
    let cases: Vec<(&str, Box<dyn Fn(&mut Campaign)>)> = vec![
      ("id", Box::new(|c| c.id = "9lives".into())),
      ("id", Box::new(|c| c.id = "a".into())),
      ("start_at", Box::new(|c| c.start_at = None)),
      ("end_at must be set", Box::new(|c| c.end_at = None)),
      ("after start_at", Box::new(|c| c.end_at = c.start_at)),
      ("future", Box::new(|c| {
        c.start_at = Some(now() - Duration::days(10));
        c.end_at = Some(now() - Duration::days(1));
      })),
      ("eligibility or steps", Box::new(|c| c.steps.clear())),
      ("step rule 1", Box::new(|c| c.steps[1] = "   ".into())),
      ("deadline", Box::new(|c| c.deadline = -1)),
      ("priority", Box::new(|c| c.priority = 101)),
      ("priority", Box::new(|c| c.priority = -5)),
    ];

    for (needle, mutate) in cases {
      let mut c = sample();
      mutate(&mut c);
      let err = c.validate(now()).unwrap_err();
      assert!(matches!(err, Error::Invalid { .. }), "{needle}: {err}");
      assert!(err.to_string().contains(needle), "expected {needle:?} in {err}");
    }
  }

  #[test]
  fn eligibility_alone_is_enough() {
    let mut c = sample();
    c.steps.clear();
    c.eligibility = "actor.tier == 'gold'".into();
    c.validate(now()).unwrap();
  }

  // ── is_active / has_tags ──────────────────────────────────────────────────

  #[test]
  fn is_active_window_is_exclusive() {
    let c = sample();
    assert!(c.is_active(now()));
    assert!(!c.is_active(c.start_at.unwrap()));
    assert!(!c.is_active(c.end_at.unwrap()));
    assert!(!c.is_active(now() + Duration::days(31)));
  }

  #[test]
  fn disabled_is_never_active() {
    let mut c = sample();
    c.enabled = false;
    for offset in [-2, 0, 5, 40] {
      assert!(!c.is_active(now() + Duration::days(offset)));
    }
  }

  #[test]
  fn has_tags_is_subset_check() {
    let mut c = sample();
    c.tags = ["a", "b"].into_iter().map(String::from).collect();
    assert!(c.has_tags::<&str>(&[]));
    assert!(c.has_tags(&["b", "a"]));
    assert!(!c.has_tags(&["a", "c"]));
  }

  // ── apply ─────────────────────────────────────────────────────────────────

  #[test]
  fn apply_tag_prefixes() {
    let mut c = sample();
    c.tags = ["keep", "drop"].into_iter().map(String::from).collect();
    let update = CampaignUpdate {
      tags: vec!["-drop".into(), "+new".into(), "bare".into(), "-absent".into()],
      ..CampaignUpdate::default()
    };
    c.apply(&update, now()).unwrap();
    assert_eq!(c.tags.iter().collect::<Vec<_>>(), vec!["bare", "keep", "new"]);
  }

  #[test]
  fn apply_updates_unused_campaign() {
    let mut c = sample();
    c.validate(now()).unwrap();
    let update = CampaignUpdate {
      steps: Some(vec!["event.kind == 'z'".into()]),
      deadline: Some(7),
      eligibility: Some("actor.vip".into()),
      priority: Some(90),
      ..CampaignUpdate::default()
    };
    c.apply(&update, now()).unwrap();
    assert_eq!(c.steps, vec!["event.kind == 'z'"]);
    assert_eq!(c.deadline, 7);
    assert_eq!(c.eligibility, "actor.vip");
    assert_eq!(c.priority, 90);
  }

  #[test]
  fn apply_rejects_protected_fields_when_in_use() {
    let updates = [
      CampaignUpdate { steps: Some(vec!["true".into()]), ..Default::default() },
      CampaignUpdate { eligibility: Some("actor.vip".into()), ..Default::default() },
      CampaignUpdate { deadline: Some(3), ..Default::default() },
      CampaignUpdate {
        start_at: Some(now() - Duration::days(2)),
        ..Default::default()
      },
      CampaignUpdate {
        end_at: Some(now() + Duration::days(60)),
        ..Default::default()
      },
    ];

    for update in updates {
      let mut c = in_use();
      let before = c.clone();
      let err = c.apply(&update, now()).unwrap_err();
      assert!(
        matches!(&err, Error::Invalid { cause: Some(cause), .. } if cause == "2 active enrolments"),
        "{err}"
      );
      assert_eq!(c, before);
    }
  }

  #[test]
  fn apply_allows_unchanged_protected_values_when_in_use() {
    let mut c = in_use();
    let update = CampaignUpdate {
      steps: Some(c.steps.clone()),
      deadline: Some(c.deadline),
      enabled: Some(true),
      priority: Some(10),
      tags: vec!["+late".into()],
      ..CampaignUpdate::default()
    };
    c.apply(&update, now()).unwrap();
    assert_eq!(c.priority, 10);
    assert!(c.tags.contains("late"));
  }

  #[test]
  fn apply_protects_capacity() {
    let mut c = in_use();
    let lower = CampaignUpdate { max_enrolments: Some(1), ..Default::default() };
    assert!(c.apply(&lower, now()).is_err());

    let unlimited = CampaignUpdate { max_enrolments: Some(0), ..Default::default() };
    c.apply(&unlimited, now()).unwrap();

    let raise = CampaignUpdate { max_enrolments: Some(5), ..Default::default() };
    c.apply(&raise, now()).unwrap();
    assert_eq!(c.max_enrolments, 5);
  }

  #[test]
  fn apply_revalidates_and_rolls_back() {
    let mut c = sample();
    c.validate(now()).unwrap();
    let before = c.clone();

    let update = CampaignUpdate {
      priority: Some(500),
      enabled: Some(false),
      ..CampaignUpdate::default()
    };
    assert!(c.apply(&update, now()).is_err());
    assert_eq!(c, before);
  }

  #[test]
  fn disabled_campaign_is_not_in_use() {
    let mut c = in_use();
    c.enabled = false;
    let update = CampaignUpdate { deadline: Some(3), ..Default::default() };
    c.apply(&update, now()).unwrap();
    assert_eq!(c.deadline, 3);
  }

  #[test]
  fn check_id_trims() {
    assert_eq!(check_id(" abc_1 ").unwrap(), "abc_1");
    assert!(check_id("bad-id").is_err());
  }
}
