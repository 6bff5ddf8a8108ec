//! HTTP server for question answering

mod handlers;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::service::QueryService;

pub use handlers::AppState;
pub use routes::api_routes;

/// Builds the application router with permissive CORS and request tracing.
pub fn router(service: Arc<QueryService>) -> Router {
    let state = Arc::new(AppState::new(service));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Startup load attempt on the blocking pool. Never fails: a load error or a panicking
/// loader is logged and left for the first request to retry.
pub async fn warm_up(service: Arc<QueryService>) -> bool {
    let loaded = match tokio::task::spawn_blocking(move || service.lifecycle().preload()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::warn!(error = %e, "ENGINE: startup load task aborted");
            false
        }
    };
    if !loaded {
        tracing::warn!("serving without a loaded model");
    }
    loaded
}

/// Start the HTTP server and serve until Ctrl-C.
pub async fn start(service: Arc<QueryService>, config: &ServerConfig) -> Result<()> {
    let app = router(service);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("  POST /process-query - Answer a question");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
