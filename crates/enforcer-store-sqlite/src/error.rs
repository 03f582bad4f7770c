//! Error type for `enforcer-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Raised by the engine's update closures, or a contract violation such as
  /// a missing record. Passed back to the engine unchanged.
  #[error(transparent)]
  Core(#[from] enforcer_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for enforcer_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(core) => core,
      other => Self::Store(Box::new(other)),
    }
  }
}
