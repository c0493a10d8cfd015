//! Application startup and lifecycle management.

use crate::config::MembershipConfig;
use crate::services::{get_metrics, init_metrics, Ledger, LedgerStore, PgLedgerStore};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MembershipConfig,
    pub store: Arc<dyn LedgerStore>,
    pub ledger: Ledger,
}

#[derive(Clone)]
struct HealthState {
    store: Arc<dyn LedgerStore>,
}

/// Liveness probe.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "membership-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "membership-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Prometheus scrape endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Operational routes (health, readiness, metrics) over any ledger store.
pub fn router(store: Arc<dyn LedgerStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(HealthState { store })
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: MembershipConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build without running migrations, for harnesses that apply them.
    pub async fn build_without_migrations(config: MembershipConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: MembershipConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let store = PgLedgerStore::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            store.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let store: Arc<dyn LedgerStore> = Arc::new(store);
        let ledger = Ledger::new(store.clone(), config.ledger.clone());

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Membership service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state: AppState {
                config,
                store,
                ledger,
            },
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// The engines backed by this application's store.
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let http_router = router(self.state.store.clone());

        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
