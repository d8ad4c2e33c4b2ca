// src/main.rs
use stow_it_now::api::{self, ApiState};
use stow_it_now::config::AppConfig;
use stow_it_now::{MemoryStore, StowageService};
use tracing_subscriber::EnvFilter;

const LOG_FILTER_VAR: &str = "STOW_IT_NOW_LOG";

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            tracing::warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let service = StowageService::new(MemoryStore::new(), app_config.planner.planner_config());

    tracing::info!("🚀 Stowage service starting...");
    if let Err(err) = api::start_api_server(app_config.api, ApiState::new(service)).await {
        tracing::error!("❌ API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
