//! Router assembly and the HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use film_store::AsyncDatabase;
use film_sync_core::CatalogueService;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of all handlers.
pub struct AppState {
    pub service: CatalogueService,
    /// Probed by the health endpoint.
    pub database: AsyncDatabase,
}

impl AppState {
    pub fn new(service: CatalogueService, database: AsyncDatabase) -> Self {
        Self { service, database }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Returns 200 while the catalogue database answers, 503 otherwise.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.database.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}

/// Full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", crate::routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `port` until `shutdown` resolves. Requests in flight at that
/// point are allowed to finish.
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "Starting film catalogue API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Film catalogue API stopped");
    Ok(())
}
