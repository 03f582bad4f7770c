//! In-memory `Store` for tests, demos and single-process deployments.
//!
//! Campaigns sit behind one lock. Each enrolment has a lock of its own, so
//! update closures for different `(actor, campaign)` pairs run in parallel
//! and the map lock is never held while a closure runs.
//!
//! Locks are taken in this order: enrolment map, campaign map, record.

use std::{collections::BTreeMap, sync::Arc};

use enforcer_core::{
  Error, Result,
  campaign::Campaign,
  enrolment::Enrolment,
  store::{CampaignQuery, Store},
};
use parking_lot::{Mutex, RwLock};


/// `(actor_id, campaign_id)`.
type Key = (String, String);

#[derive(Default)]
pub struct MemoryStore {
  campaigns:  RwLock<BTreeMap<String, Campaign>>,
  enrolments: RwLock<BTreeMap<Key, Arc<Mutex<Enrolment>>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn entry(&self, actor_id: &str, campaign_id: &str) -> Option<Arc<Mutex<Enrolment>>> {
    self.enrolments.read().get(&key(actor_id, campaign_id)).cloned()
  }
}

fn key(actor_id: &str, campaign_id: &str) -> Key {
  (actor_id.to_owned(), campaign_id.to_owned())
}

impl Store for MemoryStore {
  type Error = Error;

  async fn get_campaign<'a>(&'a self, id: &'a str) -> Result<Option<Campaign>> {
    Ok(self.campaigns.read().get(id).cloned())
  }

  async fn list_campaigns<'a>(&'a self, _query: &'a CampaignQuery) -> Result<Vec<Campaign>> {
    Ok(self.campaigns.read().values().cloned().collect())
  }

  async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign> {
    let mut campaigns = self.campaigns.write();
    if campaigns.contains_key(&campaign.id) {
      return Err(Error::Conflict(format!("campaign '{}' already exists", campaign.id)));
    }
    campaigns.insert(campaign.id.clone(), campaign.clone());
    Ok(campaign)
  }

  async fn update_campaign<'a, F>(&'a self, id: &'a str, f: F) -> Result<Campaign>
  where
    F: FnOnce(&mut Campaign) -> Result<()> + Send + 'static,
  {
    let mut campaigns = self.campaigns.write();
    let Some(stored) = campaigns.get_mut(id) else {
      return Err(Error::NotFound(format!("campaign '{id}'")));
    };
    let mut campaign = stored.clone();
    f(&mut campaign)?;
    *stored = campaign.clone();
    Ok(campaign)
  }

  async fn delete_campaign<'a>(&'a self, id: &'a str) -> Result<()> {
    self.campaigns.write().remove(id);
    Ok(())
  }

  async fn get_enrolment<'a>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
  ) -> Result<Option<Enrolment>> {
    Ok(self.entry(actor_id, campaign_id).map(|e| e.lock().clone()))
  }

  async fn list_enrolments<'a>(&'a self, actor_id: &'a str) -> Result<Vec<Enrolment>> {
    let entries: Vec<_> = self
      .enrolments
      .read()
      .iter()
      .filter(|((actor, _), _)| actor == actor_id)
      .map(|(_, e)| Arc::clone(e))
      .collect();
    Ok(entries.iter().map(|e| e.lock().clone()).collect())
  }

  async fn upsert_enrolment(&self, enrolment: Enrolment) -> Result<bool> {
    let mut enrolments = self.enrolments.write();
    let id = key(&enrolment.actor_id, &enrolment.campaign_id);
    if let Some(stored) = enrolments.get(&id) {
      *stored.lock() = enrolment;
      return Ok(false);
    }
    if let Some(campaign) = self.campaigns.write().get_mut(&enrolment.campaign_id) {
      campaign.current_enrolments += 1;
    }
    enrolments.insert(id, Arc::new(Mutex::new(enrolment)));
    Ok(true)
  }

  async fn insert_enrolment(&self, enrolment: Enrolment) -> Result<(Enrolment, bool)> {
    let mut enrolments = self.enrolments.write();
    let id = key(&enrolment.actor_id, &enrolment.campaign_id);
    if let Some(stored) = enrolments.get(&id) {
      return Ok((stored.lock().clone(), false));
    }

    let mut campaigns = self.campaigns.write();
    let Some(campaign) = campaigns.get_mut(&enrolment.campaign_id) else {
      return Err(Error::NotFound(format!("campaign '{}'", enrolment.campaign_id)));
    };
    campaign.check_capacity()?;
    campaign.current_enrolments += 1;
    drop(campaigns);

    enrolments.insert(id, Arc::new(Mutex::new(enrolment.clone())));
    Ok((enrolment, true))
  }

  async fn update_enrolment<'a, F>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
    f: F,
  ) -> Result<Option<Enrolment>>
  where
    F: FnOnce(&mut Enrolment) -> Result<bool> + Send + 'static,
  {
    let Some(entry) = self.entry(actor_id, campaign_id) else {
      return Err(Error::NotFound(format!("enrolment {actor_id}/{campaign_id}")));
    };
    let mut stored = entry.lock();
    let mut enrolment = stored.clone();
    if !f(&mut enrolment)? {
      return Ok(None);
    }
    *stored = enrolment.clone();
    Ok(Some(enrolment))
  }
}
