//! SQL schema for the enforcer SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS campaigns (
    id                 TEXT PRIMARY KEY,
    tags               TEXT NOT NULL DEFAULT '[]',   -- JSON array
    description        TEXT NOT NULL DEFAULT '',
    enabled            INTEGER NOT NULL DEFAULT 0,
    start_at           TEXT,                         -- RFC 3339 UTC
    end_at             TEXT,
    steps              TEXT NOT NULL DEFAULT '[]',   -- JSON array of rules
    is_unordered       INTEGER NOT NULL DEFAULT 0,
    eligibility        TEXT NOT NULL DEFAULT '',
    deadline           INTEGER NOT NULL DEFAULT 0,   -- days
    priority           INTEGER NOT NULL DEFAULT 0,
    max_enrolments     INTEGER NOT NULL DEFAULT 0,
    current_enrolments INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT,
    updated_at         TEXT
);

-- Status is derived on read and never stored.
-- Enrolments may outlive their campaign, so there is no foreign key.
CREATE TABLE IF NOT EXISTS enrolments (
    actor_id        TEXT NOT NULL,
    campaign_id     TEXT NOT NULL,
    started_at      TEXT,
    ends_at         TEXT,
    completed_steps TEXT NOT NULL DEFAULT '[]',      -- JSON array of StepResult
    remaining_steps INTEGER NOT NULL,
    PRIMARY KEY (actor_id, campaign_id)
);

PRAGMA user_version = 1;
";
