//! Error types for `enforcer-core`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Broad classification of an [`Error`], used by transports to pick a status
/// code and by callers to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Invalid,
  NotFound,
  Ineligible,
  Conflict,
  Internal,
}

impl ErrorKind {
  pub fn code(self) -> &'static str {
    match self {
      Self::Invalid => "invalid",
      Self::NotFound => "not_found",
      Self::Ineligible => "ineligible",
      Self::Conflict => "conflict",
      Self::Internal => "internal",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input, or an edit to a protected field of an in-use campaign.
  #[error("invalid: {msg}{}", cause_suffix(.cause))]
  Invalid { msg: String, cause: Option<String> },

  #[error("not found: {0}")]
  NotFound(String),

  /// The actor fails the eligibility rule or the campaign is at capacity.
  #[error("ineligible: {0}")]
  Ineligible(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// A broken invariant; never expected in correct operation.
  #[error("internal error: {0}")]
  Internal(String),

  #[error("rule evaluation failed for {rule:?}: {source}")]
  Rule {
    rule:   String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn invalid(msg: impl Into<String>) -> Self {
    Self::Invalid { msg: msg.into(), cause: None }
  }

  /// Attach a cause to an `Invalid` error. Other variants are returned as-is.
  pub fn with_cause(self, cause: impl Into<String>) -> Self {
    match self {
      Self::Invalid { msg, .. } => Self::Invalid { msg, cause: Some(cause.into()) },
      other => other,
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Invalid { .. } => ErrorKind::Invalid,
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::Ineligible(_) => ErrorKind::Ineligible,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::Internal(_) | Self::Rule { .. } | Self::Store(_) => ErrorKind::Internal,
    }
  }

  pub fn is(&self, kind: ErrorKind) -> bool { self.kind() == kind }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn cause_suffix(cause: &Option<String>) -> String {
  cause.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}
