//! # Credits Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store, gateway and fulfillment adapters
//! - Create the application services
//! - Start the HTTP server and the intent expiry sweep

mod config;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credits_core::{CreditsService, PaymentConfig, PaymentService, StoreService, inbound::HttpServer};
use credits_gateway::{GatewayConfig, HttpGateway};
use credits_rcon::RconPool;
use credits_repo::build_store;
use credits_types::LedgerStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,credits_app=debug,credits_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting credits server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build store (handles connection and migration)
    let store = Arc::new(build_store(&config.database_url).await?);

    // Payment gateway client
    let mut gateway_config = GatewayConfig::new(
        config.gateway_base_url,
        config.gateway_secret_key,
        config.gateway_webhook_secret,
    );
    if let Some(url) = config.checkout_success_url {
        gateway_config.success_url = url;
    }
    if let Some(url) = config.checkout_cancel_url {
        gateway_config.cancel_url = url;
    }
    let gateway = Arc::new(HttpGateway::new(gateway_config)?);

    // Fulfillment connection pool
    let fulfillment = Arc::new(RconPool::new(config.rcon_timeout));

    // Application services
    let credits = CreditsService::new(store.clone());
    let payments = PaymentService::new(store.clone(), gateway, PaymentConfig::default());
    let shop = StoreService::new(store.clone(), fulfillment);

    // Background sweep so abandoned intents expire even when nobody
    // polls their status.
    let sweep_store = store.clone();
    let sweep_interval = config.expiry_sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweep_store.expire_stale_intents(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "Expired stale payment intents"),
                Err(e) => tracing::error!(error = %e, "Intent expiry sweep failed"),
            }
        }
    });

    // Create and run the HTTP server
    let server = HttpServer::new(credits, payments, shop);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    Ok(())
}
