//! WiFi Association Service - Main Entry Point

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifi_association_service::{
    backend::WifiCtrlBackend,
    config::{CliArgs, Settings},
    core::manager::ConnectionManager,
    transport::unix_socket::{RequestHandler, UnixSocketServer},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wifi_association_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "Starting WiFi association service");
    let settings = Settings::from(args);

    // Create WiFi backend
    let backend = Arc::new(
        WifiCtrlBackend::new(settings.interface.clone(), settings.validation_probe()).await?,
    );
    info!("WiFi backend initialized for interface: {}", settings.interface);

    let manager = Arc::new(ConnectionManager::new(
        backend,
        settings.manager.clone(),
        settings.log_config(),
    ));

    let server = UnixSocketServer::new(
        settings.socket_path.clone(),
        settings.socket_mode,
        RequestHandler::new(manager.clone(), settings.probe_timeout),
    );
    let listener = server.bind().await?;
    let task = tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("Unix socket server error: {}", e);
        }
    });

    #[cfg(feature = "systemd")]
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        error!("Failed to notify systemd: {}", e);
    }

    info!("Service started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = task => {
            info!("Server task completed");
        }
    }

    info!("Shutting down...");
    if manager.cancel().await {
        info!("Cancelled running association attempt");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
