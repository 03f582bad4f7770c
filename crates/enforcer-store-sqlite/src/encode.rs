//! Encoding and decoding between domain types and the plain values stored
//! in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Tags, steps and completed steps are
//! compact JSON arrays. Counters are integers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use enforcer_core::{
  campaign::Campaign,
  enrolment::{Enrolment, StepResult},
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: Option<DateTime<Utc>>) -> Option<String> {
  dt.map(|dt| dt.to_rfc3339())
}

pub fn decode_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(|s| {
    DateTime::parse_from_rfc3339(s)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
  })
  .transpose()
}

// ─── Campaign ────────────────────────────────────────────────────────────────

pub const CAMPAIGN_COLUMNS: &str = "id, tags, description, enabled, start_at, end_at, steps, \
   is_unordered, eligibility, deadline, priority, max_enrolments, current_enrolments, \
   created_at, updated_at";

/// Raw values of a `campaigns` row, in [`CAMPAIGN_COLUMNS`] order.
pub struct RawCampaign {
  pub id:                 String,
  pub tags:               String,
  pub description:        String,
  pub enabled:            bool,
  pub start_at:           Option<String>,
  pub end_at:             Option<String>,
  pub steps:              String,
  pub is_unordered:       bool,
  pub eligibility:        String,
  pub deadline:           i32,
  pub priority:           i32,
  pub max_enrolments:     u32,
  pub current_enrolments: u32,
  pub created_at:         Option<String>,
  pub updated_at:         Option<String>,
}

impl RawCampaign {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      tags:               row.get(1)?,
      description:        row.get(2)?,
      enabled:            row.get(3)?,
      start_at:           row.get(4)?,
      end_at:             row.get(5)?,
      steps:              row.get(6)?,
      is_unordered:       row.get(7)?,
      eligibility:        row.get(8)?,
      deadline:           row.get(9)?,
      priority:           row.get(10)?,
      max_enrolments:     row.get(11)?,
      current_enrolments: row.get(12)?,
      created_at:         row.get(13)?,
      updated_at:         row.get(14)?,
    })
  }

  pub fn from_campaign(c: &Campaign) -> Result<Self> {
    Ok(Self {
      id:                 c.id.clone(),
      tags:               serde_json::to_string(&c.tags)?,
      description:        c.description.clone(),
      enabled:            c.enabled,
      start_at:           encode_dt(c.start_at),
      end_at:             encode_dt(c.end_at),
      steps:              serde_json::to_string(&c.steps)?,
      is_unordered:       c.is_unordered,
      eligibility:        c.eligibility.clone(),
      deadline:           c.deadline,
      priority:           c.priority,
      max_enrolments:     c.max_enrolments,
      current_enrolments: c.current_enrolments,
      created_at:         encode_dt(c.created_at),
      updated_at:         encode_dt(c.updated_at),
    })
  }

  pub fn into_campaign(self) -> Result<Campaign> {
    let tags: BTreeSet<String> = serde_json::from_str(&self.tags)?;
    Ok(Campaign {
      id: self.id,
      tags,
      description: self.description,
      enabled: self.enabled,
      start_at: decode_dt(self.start_at.as_deref())?,
      end_at: decode_dt(self.end_at.as_deref())?,
      steps: serde_json::from_str(&self.steps)?,
      is_unordered: self.is_unordered,
      eligibility: self.eligibility,
      deadline: self.deadline,
      priority: self.priority,
      max_enrolments: self.max_enrolments,
      current_enrolments: self.current_enrolments,
      created_at: decode_dt(self.created_at.as_deref())?,
      updated_at: decode_dt(self.updated_at.as_deref())?,
    })
  }

  pub fn write(&self, conn: &rusqlite::Connection, verb: &str) -> rusqlite::Result<usize> {
    conn.execute(
      &format!(
        "{verb} INTO campaigns ({CAMPAIGN_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
      ),
      rusqlite::params![
        self.id,
        self.tags,
        self.description,
        self.enabled,
        self.start_at,
        self.end_at,
        self.steps,
        self.is_unordered,
        self.eligibility,
        self.deadline,
        self.priority,
        self.max_enrolments,
        self.current_enrolments,
        self.created_at,
        self.updated_at,
      ],
    )
  }
}

// ─── Enrolment ───────────────────────────────────────────────────────────────

pub const ENROLMENT_COLUMNS: &str =
  "actor_id, campaign_id, started_at, ends_at, completed_steps, remaining_steps";

/// Raw values of an `enrolments` row, in [`ENROLMENT_COLUMNS`] order.
pub struct RawEnrolment {
  pub actor_id:        String,
  pub campaign_id:     String,
  pub started_at:      Option<String>,
  pub ends_at:         Option<String>,
  pub completed_steps: String,
  pub remaining_steps: i64,
}

impl RawEnrolment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      actor_id:        row.get(0)?,
      campaign_id:     row.get(1)?,
      started_at:      row.get(2)?,
      ends_at:         row.get(3)?,
      completed_steps: row.get(4)?,
      remaining_steps: row.get(5)?,
    })
  }

  pub fn from_enrolment(e: &Enrolment) -> Result<Self> {
    Ok(Self {
      actor_id:        e.actor_id.clone(),
      campaign_id:     e.campaign_id.clone(),
      started_at:      encode_dt(e.started_at),
      ends_at:         encode_dt(e.ends_at),
      completed_steps: serde_json::to_string(&e.completed_steps)?,
      remaining_steps: i64::try_from(e.remaining_steps)
        .map_err(|_| Error::Decode(format!("remaining_steps {}", e.remaining_steps)))?,
    })
  }

  pub fn into_enrolment(self) -> Result<Enrolment> {
    let completed_steps: Vec<StepResult> = serde_json::from_str(&self.completed_steps)?;
    Ok(Enrolment {
      remaining_steps: usize::try_from(self.remaining_steps)
        .map_err(|_| Error::Decode(format!("remaining_steps {}", self.remaining_steps)))?,
      started_at: decode_dt(self.started_at.as_deref())?,
      ends_at: decode_dt(self.ends_at.as_deref())?,
      actor_id: self.actor_id,
      campaign_id: self.campaign_id,
      completed_steps,
    })
  }

  pub fn write(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute(
      &format!(
        "INSERT OR REPLACE INTO enrolments ({ENROLMENT_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
      ),
      rusqlite::params![
        self.actor_id,
        self.campaign_id,
        self.started_at,
        self.ends_at,
        self.completed_steps,
        self.remaining_steps,
      ],
    )
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_round_trip_through_text() {
    let t = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap();
    let encoded = encode_dt(Some(t));
    assert_eq!(decode_dt(encoded.as_deref()).unwrap(), Some(t));
    assert_eq!(decode_dt(None).unwrap(), None);
    assert!(matches!(decode_dt(Some("yesterday")), Err(Error::Decode(_))));
  }

  #[test]
  fn negative_remaining_steps_is_rejected() {
    let raw = RawEnrolment {
      actor_id:        "a".into(),
      campaign_id:     "c".into(),
      started_at:      None,
      ends_at:         None,
      completed_steps: "[]".into(),
      remaining_steps: -1,
    };
    assert!(matches!(raw.into_enrolment(), Err(Error::Decode(_))));
  }
}
