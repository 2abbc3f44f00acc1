use anyhow::{Context, Result};
use dotenvy::dotenv;
use shared::telemetry::{self, TelemetryConfig};
use tracing::{error, info};

use justcall_connector::api::{create_router, spawn_job_sweeper, ApiState};
use justcall_connector::config::JustCallConnectorConfig;
use justcall_connector::sync::TranscriptFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let telemetry_config = TelemetryConfig::from_env("justcall-connector");
    telemetry::init_telemetry(telemetry_config)?;

    info!("Starting JustCall Connector");

    let config = JustCallConnectorConfig::from_env()?;
    info!(
        "Using {} connection strategies, {:?} between pages, probe policy {:?}",
        config.fetcher.strategies.len(),
        config.fetcher.page_delay,
        config.fetcher.probe_policy
    );

    let fetcher =
        TranscriptFetcher::new(config.fetcher).context("Failed to create transcript fetcher")?;
    let state = ApiState::new(fetcher);
    spawn_job_sweeper(state.clone(), config.job_ttl);
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("HTTP server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("HTTP server stopped: {:?}", e);
    }

    Ok(())
}
