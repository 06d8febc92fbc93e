//! StoryReel HTTP server

use std::net::SocketAddr;

use storyreel_lib::api;
use storyreel_lib::core::settings::{resolve_data_dir, SettingsManager};
use storyreel_lib::{init_logging, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let data_dir = resolve_data_dir(None);
    init_logging(&data_dir.join("logs"));

    if let Err(e) = run(data_dir).await {
        error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(data_dir: std::path::PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let settings = SettingsManager::new(data_dir.clone()).load_with_env();
    let state = AppState::from_settings(&settings, &data_dir)?;
    let app = api::router(state, &settings.server);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
