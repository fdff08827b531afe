pub mod aggregation;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod llm;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod plan_extractor;
pub mod routes;
pub mod strava;
pub mod units;
pub mod zones;

#[cfg(test)]
mod test_utils;

use config::AppConfig;
use db::AppState;
use std::sync::Arc;

/// Load configuration, open the database and serve until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();

  let config = AppConfig::from_env()?;
  logging::init(config.log_format);

  if config.strava.is_none() {
    tracing::warn!("Strava credentials not set, import endpoints will report not connected");
  }
  if config.llm.is_none() {
    tracing::warn!("ANTHROPIC_API_KEY not set, coach endpoints will report not connected");
  }

  let pool = db::initialize_db(&config.database_url).await?;
  let bind_addr = config.bind_addr.clone();
  let state = Arc::new(AppState { db: pool, config });

  let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
  tracing::info!(addr = %bind_addr, "Listening");

  axum::serve(listener, routes::router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  tracing::info!("Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "Failed to listen for shutdown signal");
  }
}
