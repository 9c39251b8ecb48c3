// Event Registration Server
// Issues QR credentials over HTTP and checks them in at the entrance

use registration_api::{
    dispatcher_from_config, router, telemetry, AppState, DispatchMode, ServerConfig,
};
use registration_core::Ledger;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal outside development
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let config = ServerConfig::load()?;
    telemetry::init(config.json_logs);

    info!(
        service = %config.ledger.service_name,
        version = %config.ledger.service_version,
        "Starting registration server"
    );

    info!(data_dir = %config.ledger.data_dir.display(), "Opening ledger");
    let ledger = Arc::new(Ledger::open(config.ledger.clone()).await?);

    if config.seed_sample_data && ledger.directory().seed_sample_data()? {
        info!("Sample administrator and event created");
    }

    let (mode, notifier) = dispatcher_from_config(&config.smtp)?;
    if mode == DispatchMode::LogOnly {
        warn!("SMTP not configured, confirmations will only be logged");
    }

    let app = router(AppState::new(ledger.clone(), notifier));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledger.shutdown().await?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
