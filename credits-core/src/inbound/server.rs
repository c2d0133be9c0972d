//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use credits_types::{Fulfillment, LedgerStore, PaymentGateway};

use super::handlers::{self, AppState};
use crate::{CreditsService, PaymentService, StoreService};

/// HTTP Server for the Credits API.
pub struct HttpServer<S: LedgerStore, G: PaymentGateway, F: Fulfillment> {
    state: Arc<AppState<S, G, F>>,
}

impl<S: LedgerStore, G: PaymentGateway, F: Fulfillment> HttpServer<S, G, F> {
    pub fn new(
        credits: CreditsService<S>,
        payments: PaymentService<S, G>,
        store: StoreService<S, F>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                credits,
                payments,
                store,
            }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            // Accounts & ledger
            .route("/api/accounts", post(handlers::create_account::<S, G, F>))
            .route("/api/accounts", get(handlers::list_accounts::<S, G, F>))
            .route("/api/accounts/{id}", get(handlers::get_account::<S, G, F>))
            .route(
                "/api/accounts/{id}/balance",
                get(handlers::balance::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/entries",
                get(handlers::history::<S, G, F>),
            )
            .route("/api/credits/adjust", post(handlers::adjust::<S, G, F>))
            .route("/api/credits/reward", post(handlers::reward::<S, G, F>))
            .route("/api/credits/transfer", post(handlers::transfer::<S, G, F>))
            // Payments
            .route(
                "/api/payments/intents",
                post(handlers::create_intent::<S, G, F>),
            )
            .route(
                "/api/payments/intents/{id}",
                get(handlers::intent_status::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/intents",
                get(handlers::list_intents::<S, G, F>),
            )
            .route("/api/payments/webhook", post(handlers::webhook::<S, G, F>))
            // Payment methods
            .route(
                "/api/payments/methods",
                post(handlers::attach_method::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/methods",
                get(handlers::list_methods::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/methods/{token}",
                delete(handlers::detach_method::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/methods/{token}/default",
                post(handlers::set_default_method::<S, G, F>),
            )
            // Shop
            .route("/api/items", get(handlers::list_items::<S, G, F>))
            .route("/api/items", post(handlers::create_item::<S, G, F>))
            .route(
                "/api/destinations",
                post(handlers::create_destination::<S, G, F>),
            )
            .route("/api/store/purchase", post(handlers::purchase::<S, G, F>))
            .route(
                "/api/accounts/{id}/orders",
                get(handlers::list_orders::<S, G, F>),
            )
            .route(
                "/api/accounts/{id}/orders/{order_id}",
                get(handlers::get_order::<S, G, F>),
            )
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
