//! [`SqliteStore`]: the SQLite implementation of [`Store`].

use std::path::Path;

use enforcer_core::{
  campaign::Campaign,
  enrolment::Enrolment,
  store::{CampaignQuery, Store},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};

use crate::{
  Error, Result,
  encode::{CAMPAIGN_COLUMNS, ENROLMENT_COLUMNS, RawCampaign, RawEnrolment},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row access ──────────────────────────────────────────────────────────────
//
// These run on the connection thread, inside `Connection::call`.

fn read_campaign(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
  conn
    .query_row(
      &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
      rusqlite::params![id],
      RawCampaign::from_row,
    )
    .optional()?
    .map(RawCampaign::into_campaign)
    .transpose()
}

fn read_enrolment(conn: &Connection, actor_id: &str, campaign_id: &str) -> Result<Option<Enrolment>> {
  conn
    .query_row(
      &format!(
        "SELECT {ENROLMENT_COLUMNS} FROM enrolments WHERE actor_id = ?1 AND campaign_id = ?2"
      ),
      rusqlite::params![actor_id, campaign_id],
      RawEnrolment::from_row,
    )
    .optional()?
    .map(RawEnrolment::into_enrolment)
    .transpose()
}

fn create_campaign_tx(conn: &mut Connection, campaign: Campaign) -> Result<Campaign> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  if read_campaign(&tx, &campaign.id)?.is_some() {
    return Err(enforcer_core::Error::Conflict(format!("campaign '{}' already exists", campaign.id)).into());
  }
  RawCampaign::from_campaign(&campaign)?.write(&tx, "INSERT")?;
  tx.commit()?;
  Ok(campaign)
}

fn update_campaign_tx<F>(conn: &mut Connection, id: &str, f: F) -> Result<Campaign>
where
  F: FnOnce(&mut Campaign) -> enforcer_core::Result<()>,
{
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let Some(mut campaign) = read_campaign(&tx, id)? else {
    return Err(enforcer_core::Error::NotFound(format!("campaign '{id}'")).into());
  };
  // Dropping `tx` on error rolls back; nothing has been written yet anyway.
  f(&mut campaign)?;
  RawCampaign::from_campaign(&campaign)?.write(&tx, "INSERT OR REPLACE")?;
  tx.commit()?;
  Ok(campaign)
}

fn upsert_enrolment_tx(conn: &mut Connection, enrolment: &Enrolment) -> Result<bool> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let created = read_enrolment(&tx, &enrolment.actor_id, &enrolment.campaign_id)?.is_none();
  RawEnrolment::from_enrolment(enrolment)?.write(&tx)?;
  if created {
    tx.execute(
      "UPDATE campaigns SET current_enrolments = current_enrolments + 1 WHERE id = ?1",
      rusqlite::params![enrolment.campaign_id],
    )?;
  }
  tx.commit()?;
  Ok(created)
}

fn insert_enrolment_tx(conn: &mut Connection, enrolment: Enrolment) -> Result<(Enrolment, bool)> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  if let Some(existing) = read_enrolment(&tx, &enrolment.actor_id, &enrolment.campaign_id)? {
    return Ok((existing, false));
  }
  let Some(campaign) = read_campaign(&tx, &enrolment.campaign_id)? else {
    return Err(
      enforcer_core::Error::NotFound(format!("campaign '{}'", enrolment.campaign_id)).into(),
    );
  };
  campaign.check_capacity()?;
  RawEnrolment::from_enrolment(&enrolment)?.write(&tx)?;
  tx.execute(
    "UPDATE campaigns SET current_enrolments = current_enrolments + 1 WHERE id = ?1",
    rusqlite::params![enrolment.campaign_id],
  )?;
  tx.commit()?;
  Ok((enrolment, true))
}

fn update_enrolment_tx<F>(
  conn: &mut Connection,
  actor_id: &str,
  campaign_id: &str,
  f: F,
) -> Result<Option<Enrolment>>
where
  F: FnOnce(&mut Enrolment) -> enforcer_core::Result<bool>,
{
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let Some(mut enrolment) = read_enrolment(&tx, actor_id, campaign_id)? else {
    return Err(
      enforcer_core::Error::NotFound(format!("enrolment {actor_id}/{campaign_id}")).into(),
    );
  };
  if !f(&mut enrolment)? {
    return Ok(None);
  }
  RawEnrolment::from_enrolment(&enrolment)?.write(&tx)?;
  tx.commit()?;
  Ok(Some(enrolment))
}

// ─── Store impl ──────────────────────────────────────────────────────────────

impl Store for SqliteStore {
  type Error = Error;

  // ── Campaigns ─────────────────────────────────────────────────────────────

  async fn get_campaign<'a>(&'a self, id: &'a str) -> Result<Option<Campaign>> {
    let id = id.to_owned();
    self.conn.call(move |conn| Ok(read_campaign(conn, &id))).await?
  }

  async fn list_campaigns<'a>(&'a self, _query: &'a CampaignQuery) -> Result<Vec<Campaign>> {
    let raws: Vec<RawCampaign> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawCampaign::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCampaign::into_campaign).collect()
  }

  async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign> {
    self.conn.call(move |conn| Ok(create_campaign_tx(conn, campaign))).await?
  }

  async fn update_campaign<'a, F>(&'a self, id: &'a str, f: F) -> Result<Campaign>
  where
    F: FnOnce(&mut Campaign) -> enforcer_core::Result<()> + Send + 'static,
  {
    let id = id.to_owned();
    self.conn.call(move |conn| Ok(update_campaign_tx(conn, &id, f))).await?
  }

  async fn delete_campaign<'a>(&'a self, id: &'a str) -> Result<()> {
    let id = id.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM campaigns WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Enrolments ────────────────────────────────────────────────────────────

  async fn get_enrolment<'a>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
  ) -> Result<Option<Enrolment>> {
    let (actor_id, campaign_id) = (actor_id.to_owned(), campaign_id.to_owned());
    self
      .conn
      .call(move |conn| Ok(read_enrolment(conn, &actor_id, &campaign_id)))
      .await?
  }

  async fn list_enrolments<'a>(&'a self, actor_id: &'a str) -> Result<Vec<Enrolment>> {
    let actor_id = actor_id.to_owned();
    let raws: Vec<RawEnrolment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENROLMENT_COLUMNS} FROM enrolments WHERE actor_id = ?1 ORDER BY campaign_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![actor_id], RawEnrolment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEnrolment::into_enrolment).collect()
  }

  async fn upsert_enrolment(&self, enrolment: Enrolment) -> Result<bool> {
    self.conn.call(move |conn| Ok(upsert_enrolment_tx(conn, &enrolment))).await?
  }

  async fn insert_enrolment(&self, enrolment: Enrolment) -> Result<(Enrolment, bool)> {
    self.conn.call(move |conn| Ok(insert_enrolment_tx(conn, enrolment))).await?
  }

  async fn update_enrolment<'a, F>(
    &'a self,
    actor_id: &'a str,
    campaign_id: &'a str,
    f: F,
  ) -> Result<Option<Enrolment>>
  where
    F: FnOnce(&mut Enrolment) -> enforcer_core::Result<bool> + Send + 'static,
  {
    let (actor_id, campaign_id) = (actor_id.to_owned(), campaign_id.to_owned());
    self
      .conn
      .call(move |conn| Ok(update_enrolment_tx(conn, &actor_id, &campaign_id, f)))
      .await?
  }
}
