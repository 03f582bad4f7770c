//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use enforcer_core::{
  Engine, Error as CoreError, ErrorKind,
  actor::{Action, Actor},
  campaign::{Campaign, CampaignUpdate},
  enrolment::{Enrolment, EnrolmentStatus, StepResult},
  store::{CampaignQuery, Store},
};
use enforcer_rules::ExprEvaluator;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn campaign(id: &str, steps: &[&str]) -> Campaign {
  let now = Utc::now();
  Campaign {
    id: id.into(),
    enabled: true,
    description: "spring promotion".into(),
    tags: ["promo", "spring"].into_iter().map(String::from).collect(),
    start_at: Some(now - Duration::days(1)),
    end_at: Some(now + Duration::days(30)),
    steps: steps.iter().map(|s| s.to_string()).collect(),
    eligibility: "actor.tier == 'gold'".into(),
    deadline: 14,
    priority: 7,
    max_enrolments: 100,
    created_at: Some(now),
    updated_at: Some(now),
    ..Campaign::default()
  }
}

// ─── Campaigns ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn campaign_fields_survive_storage() {
  let s = store().await;
  let original = campaign("spring", &["event.kind == 'a'", "event.kind == 'b'"]);
  s.create_campaign(original.clone()).await.unwrap();

  let fetched = s.get_campaign("spring").await.unwrap().unwrap();
  assert_eq!(fetched, original);
  assert!(s.get_campaign("autumn").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_create_is_conflict() {
  let s = store().await;
  s.create_campaign(campaign("dup", &["true"])).await.unwrap();

  let err = s.create_campaign(campaign("dup", &["true"])).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Conflict(_))));
  assert!(CoreError::from(err).is(ErrorKind::Conflict));
}

#[tokio::test]
async fn list_campaigns_is_ordered_by_id() {
  let s = store().await;
  for id in ["zeta", "alpha", "mid"] {
    s.create_campaign(campaign(id, &["true"])).await.unwrap();
  }
  let ids: Vec<_> = s
    .list_campaigns(&CampaignQuery::default())
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.id)
    .collect();
  assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn failed_update_writes_nothing() {
  let s = store().await;
  s.create_campaign(campaign("c1", &["true"])).await.unwrap();

  let err = s
    .update_campaign("c1", |c| {
      c.priority = 99;
      Err(CoreError::invalid("rejected"))
    })
    .await
    .unwrap_err();
  assert!(CoreError::from(err).is(ErrorKind::Invalid));
  assert_eq!(s.get_campaign("c1").await.unwrap().unwrap().priority, 7);

  let updated = s
    .update_campaign("c1", |c| {
      c.tags.insert("extra".into());
      Ok(())
    })
    .await
    .unwrap();
  assert!(updated.tags.contains("extra"));
  assert_eq!(s.get_campaign("c1").await.unwrap().unwrap(), updated);
}

#[tokio::test]
async fn update_missing_campaign_is_not_found() {
  let s = store().await;
  let err = s.update_campaign("ghost", |_| Ok(())).await.unwrap_err();
  assert!(CoreError::from(err).is(ErrorKind::NotFound));
}

#[tokio::test]
async fn delete_is_idempotent() {
  let s = store().await;
  s.create_campaign(campaign("gone", &["true"])).await.unwrap();
  s.delete_campaign("gone").await.unwrap();
  s.delete_campaign("gone").await.unwrap();
  assert!(s.get_campaign("gone").await.unwrap().is_none());
}

// ─── Enrolments ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_increments_counter_once() {
  let s = store().await;
  let c = campaign("counted", &["true", "true"]);
  s.create_campaign(c.clone()).await.unwrap();

  let mut enr = Enrolment::eligible("alice", &c);
  enr.start(&c, Utc::now());
  assert!(s.upsert_enrolment(enr.clone()).await.unwrap());
  assert!(!s.upsert_enrolment(enr.clone()).await.unwrap());

  assert_eq!(s.get_campaign("counted").await.unwrap().unwrap().current_enrolments, 1);
  assert_eq!(s.get_enrolment("alice", "counted").await.unwrap(), Some(enr));
}

#[tokio::test]
async fn insert_enrolment_respects_existing_and_capacity() {
  let s = store().await;
  let mut c = campaign("seats", &["true", "true"]);
  c.max_enrolments = 1;
  s.create_campaign(c.clone()).await.unwrap();

  let mut enr = Enrolment::eligible("alice", &c);
  enr.start(&c, Utc::now());
  let (stored, created) = s.insert_enrolment(enr.clone()).await.unwrap();
  assert!(created);
  assert_eq!(stored, enr);

  s.update_enrolment("alice", "seats", |e| {
    e.remaining_steps = 1;
    Ok(true)
  })
  .await
  .unwrap();
  let (kept, created) = s.insert_enrolment(enr).await.unwrap();
  assert!(!created);
  assert_eq!(kept.remaining_steps, 1);

  let err = s.insert_enrolment(Enrolment::eligible("bob", &c)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Ineligible(_))));
  assert!(s.get_enrolment("bob", "seats").await.unwrap().is_none());
  assert_eq!(s.get_campaign("seats").await.unwrap().unwrap().current_enrolments, 1);

  let ghost = campaign("ghost", &["true"]);
  let err = s.insert_enrolment(Enrolment::eligible("alice", &ghost)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NotFound(_))));
}

#[tokio::test]
async fn update_enrolment_round_trips_steps() {
  let s = store().await;
  let c = campaign("c", &["a", "b"]);
  let mut enr = Enrolment::eligible("alice", &c);
  enr.start(&c, Utc::now());
  s.upsert_enrolment(enr).await.unwrap();

  let done_at = Utc::now();
  let written = s
    .update_enrolment("alice", "c", move |e| {
      e.completed_steps.push(StepResult { step_id: 1, action_id: "act".into(), done_at });
      Ok(true)
    })
    .await
    .unwrap()
    .unwrap();

  let stored = s.get_enrolment("alice", "c").await.unwrap().unwrap();
  assert_eq!(stored, written);
  assert_eq!(stored.completed_steps[0].step_id, 1);

  let declined = s
    .update_enrolment("alice", "c", |e| {
      e.completed_steps.clear();
      Ok(false)
    })
    .await
    .unwrap();
  assert!(declined.is_none());
  assert_eq!(s.get_enrolment("alice", "c").await.unwrap().unwrap(), stored);

  let err = s.update_enrolment("bob", "c", |_| Ok(true)).await.unwrap_err();
  assert!(CoreError::from(err).is(ErrorKind::NotFound));
}

#[tokio::test]
async fn list_enrolments_filters_by_actor() {
  let s = store().await;
  for id in ["b_camp", "a_camp"] {
    let c = campaign(id, &["true"]);
    s.upsert_enrolment(Enrolment::eligible("alice", &c)).await.unwrap();
    s.upsert_enrolment(Enrolment::eligible("bob", &c)).await.unwrap();
  }
  let ids: Vec<_> = s
    .list_enrolments("alice")
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.campaign_id)
    .collect();
  assert_eq!(ids, vec!["a_camp", "b_camp"]);
}

#[tokio::test]
async fn data_persists_across_reopen() {
  let path = std::env::temp_dir().join(format!(
    "enforcer-test-{}-{}.db",
    std::process::id(),
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
  ));

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.create_campaign(campaign("durable", &["true"])).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_campaign("durable").await.unwrap().is_some());

  drop(s);
  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}

// ─── Engine over SQLite ──────────────────────────────────────────────────────

#[tokio::test]
async fn engine_progresses_enrolment() {
  let e = Engine::new(Arc::new(store().await), Arc::new(ExprEvaluator));
  let mut c = campaign("journey", &["event.kind == 'signup'", "event.kind == 'purchase'"]);
  c.eligibility.clear();
  e.create_campaign(c).await.unwrap();

  let alice = Actor::new("alice");
  let (_, created) = e.enrol("journey", &alice).await.unwrap();
  assert!(created);

  for (id, kind) in [("a1", "signup"), ("a2", "signup"), ("a3", "purchase")] {
    let mut action = Action::new(id);
    action.data.insert("kind".into(), kind.into());
    e.ingest(&alice, action, false).await.unwrap();
  }

  let enr = e.get_enrolment("journey", &alice).await.unwrap();
  assert_eq!(enr.status(), EnrolmentStatus::Completed);
  let actions: Vec<_> = enr.completed_steps.iter().map(|s| s.action_id.as_str()).collect();
  assert_eq!(actions, vec!["a1", "a3"]);
}

#[tokio::test]
async fn engine_rejects_protected_edit() {
  let e = Engine::new(Arc::new(store().await), Arc::new(ExprEvaluator));
  let mut c = campaign("locked", &["true", "true"]);
  c.eligibility.clear();
  e.create_campaign(c).await.unwrap();
  e.enrol("locked", &Actor::new("alice")).await.unwrap();
  let before = e.get_campaign("locked").await.unwrap();

  let update = CampaignUpdate { deadline: Some(1), ..CampaignUpdate::default() };
  let err = e.update_campaign("locked", update).await.unwrap_err();
  assert!(err.is(ErrorKind::Invalid));
  assert_eq!(e.get_campaign("locked").await.unwrap(), before);
}
