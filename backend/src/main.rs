mod api;
mod db;
mod errors;
mod models;
mod state;

use crate::errors::ApiError;
use crate::state::AppState;
use shielded_pool::PoolConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Keys, pool.json and the sqlite file all live under DATA_DIR.
    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
    std::fs::create_dir_all(&data_dir).map_err(|_| ApiError::Internal)?;

    let config = load_config(&data_dir)?;

    let db_path = data_dir.join("pool.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    let state = AppState::bootstrap(db, data_dir, config).await?;
    tracing::info!(pool = %state.address, "pool deployed");

    let app = api::router(state);

    let addr = std::env::var("BACKEND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(%addr, "backend listening");

    axum::serve(listener, app).await.map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// `$DATA_DIR/pool.json` when present, defaults otherwise.
fn load_config(data_dir: &Path) -> Result<PoolConfig, ApiError> {
    let path = data_dir.join("pool.json");
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no pool config, using defaults");
        return Ok(PoolConfig::default());
    }

    let raw = std::fs::read_to_string(&path).map_err(|_| ApiError::Internal)?;
    serde_json::from_str(&raw).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "invalid pool config");
        ApiError::BadRequest(e.to_string())
    })
}
