//! Partnerpay Service - HTTP API for partner payouts and reconciliation
//!
//! This is the main entry point for the partnerpay service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partnerpay_service::{create_router, AppState, ServiceConfig};
use partnerpay_store::{Ledger, MemoryLedger, PgLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,partnerpay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Partnerpay Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        recipient_api_configured = %config.recipient_api_url.is_some(),
        notifications_configured = %config.notify_webhook_url.is_some(),
        "Service configuration loaded"
    );

    // Open the ledger: PostgreSQL when configured, in-memory otherwise
    let ledger: Arc<dyn Ledger> = if let Some(database_url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL ledger");
        Arc::new(PgLedger::connect(database_url).await?)
    } else {
        tracing::warn!("DATABASE_URL not set - using in-memory ledger, state will not persist");
        Arc::new(MemoryLedger::new())
    };

    // Build app state
    let state = AppState::new(ledger, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
