//! enforcer-server binary.
//!
//! Reads `enforcer.toml` (or the path given with `--config`) and `ENFORCER_*`
//! environment variables, opens the configured store, and serves the JSON
//! API over HTTP until SIGINT or SIGTERM.

use std::{future::IntoFuture as _, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use enforcer_api::AppState;
use enforcer_core::{Engine, actor::ActorResolver, store::Store};
use enforcer_rules::ExprEvaluator;
use enforcer_server::{ServerConfig, StaticResolver, StoreKind};
use enforcer_store_memory::MemoryStore;
use enforcer_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::Notify};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
  Text,
  Json,
}

#[derive(Parser)]
#[command(author, version, about = "Campaign enrolment server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "enforcer.toml")]
  config: PathBuf,

  /// Listen address, overriding `host` and `port` from the configuration.
  #[arg(long)]
  addr: Option<String>,

  #[arg(long, value_enum, default_value_t = LogFormat::Text)]
  log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Initialise tracing.
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  match cli.log_format {
    LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
  }

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  let address = cli.addr.clone().unwrap_or_else(|| server_cfg.address());
  let resolver: Arc<dyn ActorResolver> =
    Arc::new(StaticResolver::new(server_cfg.actor_attributes.clone()));

  match server_cfg.store_kind() {
    StoreKind::Memory => {
      warn!("using the in-memory store; state is lost on exit");
      serve(MemoryStore::new(), resolver, &address, &server_cfg).await
    }
    StoreKind::Sqlite(path) => {
      let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?;
      info!(path = %path.display(), "opened sqlite store");
      serve(store, resolver, &address, &server_cfg).await
    }
  }
}

async fn serve<S: Store>(
  store: S,
  resolver: Arc<dyn ActorResolver>,
  address: &str,
  server_cfg: &ServerConfig,
) -> anyhow::Result<()> {
  let engine = Engine::new(Arc::new(store), Arc::new(ExprEvaluator));
  let app = enforcer_server::app(AppState::new(engine, resolver));

  let listener = TcpListener::bind(address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("Listening on http://{address}");

  let stopping = Arc::new(Notify::new());
  let server = axum::serve(listener, app)
    .with_graceful_shutdown({
      let stopping = Arc::clone(&stopping);
      async move {
        shutdown_signal().await;
        stopping.notify_one();
      }
    })
    .into_future();

  let grace = Duration::from_secs(server_cfg.shutdown_grace_secs);
  tokio::select! {
    res = server => res.context("server error")?,
    () = async {
      stopping.notified().await;
      tokio::time::sleep(grace).await;
    } => warn!(grace_secs = grace.as_secs(), "grace period elapsed; dropping open connections"),
  }

  info!("shutdown complete");
  Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(err) = tokio::signal::ctrl_c().await {
      error!(%err, "failed to install Ctrl+C handler");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(err) => {
        error!(%err, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {},
    () = terminate => {},
  }
  info!("shutdown signal received");
}
