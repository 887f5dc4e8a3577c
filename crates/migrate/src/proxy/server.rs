//! HTTP side of the remote invocation endpoint

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

use super::{dispatch, ProxyRequest, ProxyResponse};
use crate::engine::MigrationEngine;
use crate::error::{MigrateError, MigrateResult};

/// Path receiving proxied calls
pub const INVOKE_PATH: &str = "/invoke";
/// Liveness probe path
pub const HEALTH_PATH: &str = "/health";

/// Router serving `POST /invoke` and `GET /health` over an engine
pub fn router(engine: Arc<dyn MigrationEngine>) -> Router {
    Router::new()
        .route(INVOKE_PATH, post(invoke))
        .route(HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn invoke(
    State(engine): State<Arc<dyn MigrationEngine>>,
    Json(request): Json<ProxyRequest>,
) -> Json<ProxyResponse> {
    Json(dispatch(engine.as_ref(), request).await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve the endpoint until Ctrl+C or SIGTERM
pub async fn serve(engine: Arc<dyn MigrationEngine>, addr: SocketAddr) -> MigrateResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MigrateError::proxy(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("Migration endpoint listening on http://{}{}", addr, INVOKE_PATH);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MigrateError::proxy(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::warn!("Received terminate signal, shutting down"),
    }
}
