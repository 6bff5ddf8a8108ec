//! Route definitions

use std::sync::Arc;

use axum::{routing::post, Router};

use super::handlers::{process_query, AppState};

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route("/process-query", post(process_query))
}
