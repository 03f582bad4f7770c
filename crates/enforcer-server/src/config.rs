//! Server configuration, read from an optional TOML file layered under
//! `ENFORCER_*` environment variables.

use std::path::{Path, PathBuf};

use enforcer_core::env::Attributes;
use serde::Deserialize;

/// Runtime server configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  /// `memory`, or the path of a SQLite database file.
  pub store:               String,
  /// Seconds in-flight requests get to finish after a shutdown signal.
  pub shutdown_grace_secs: u64,
  /// Attached to every resolved actor.
  pub actor_attributes:    Attributes,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".to_string(),
      port:                8080,
      store:               "memory".to_string(),
      shutdown_grace_secs: 10,
      actor_attributes:    Attributes::new(),
    }
  }
}

/// Where enrolment state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
  Memory,
  Sqlite(PathBuf),
}

impl ServerConfig {
  /// Load from `path` (which may be absent) and the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ENFORCER"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_kind(&self) -> StoreKind {
    match self.store.trim() {
      "" | "memory" => StoreKind::Memory,
      path => StoreKind::Sqlite(expand_tilde(Path::new(path))),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
