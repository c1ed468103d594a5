use anyhow::Result;
use tracing::info;

use pill_dispenser_api::app::{create_app, AppState};
use pill_dispenser_api::config::Config;
use pill_dispenser_api::middleware::{init_metrics, logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging and metrics
    init_logging(&config.logging)?;
    init_metrics()?;

    info!("Starting Pill Dispenser API v{}", env!("CARGO_PKG_VERSION"));

    // Connect to the realtime store
    let store = persistence::create_store(&config.store.settings())?;
    info!(backend = store.backend(), "Realtime store ready");

    // Build application
    let addr = config.socket_addr()?;
    let state = AppState::new(config, store);
    let app = create_app(state.clone());

    // Start server
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams never finish on their own.
            draining.shutdown();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
