use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pget_core::config::ConfigManager;
use pget_server::routes;
use pget_server::service::DownloadService;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // optional first argument overrides the config file location
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pget")
            .join("config.toml")
    });

    let mut manager = ConfigManager::load(&config_path).expect("cannot load config");
    for warning in manager.validate() {
        warn!(%warning, "config value adjusted");
    }
    info!(path = %manager.path().display(), "configuration loaded");

    let config = manager.get().clone();
    let bind = config.server.bind.clone();
    let service = Arc::new(DownloadService::new(config));
    let app = routes::router(service.clone());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .expect("cannot bind server address");
    info!(%bind, "pget server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await
        .expect("server error");
}

async fn shutdown_signal(service: Arc<DownloadService>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    service.shutdown();
}
