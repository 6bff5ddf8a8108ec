//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use answerd_protocol::{ErrorResponse, QueryRequest, QueryResponse};

use crate::errors::{EngineError, ServiceError};
use crate::service::QueryService;

const ENGINE_UNAVAILABLE_MESSAGE: &str = "Model not loaded. Please check server logs.";
const GENERATION_FAILURE_MESSAGE: &str = "Failed to generate response from model.";

/// Shared application state
pub struct AppState {
    pub service: Arc<QueryService>,
}

impl AppState {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }
}

/// Question answering endpoint
pub async fn process_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let query = match payload {
        Ok(Json(request)) => match request.into_query() {
            Ok(query) => query,
            Err(e) => return ServiceError::from(e).into_response(),
        },
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "QUERY: unreadable request body");
            return ServiceError::InvalidRequest.into_response();
        }
    };

    // Model load and decoding block; keep them off the async workers.
    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.answer(&query)).await {
        Ok(Ok(answer)) => (StatusCode::OK, Json(QueryResponse { response: answer })).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(join_error) => {
            error!(error = %join_error, "QUERY: inference task aborted");
            ServiceError::GenerationFailure(EngineError::Other(join_error.to_string()))
                .into_response()
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::InvalidRequest => (StatusCode::BAD_REQUEST, self.to_string()),
            ServiceError::ResourceNotFound(_) | ServiceError::EngineUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ENGINE_UNAVAILABLE_MESSAGE.to_string(),
            ),
            ServiceError::GenerationFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERATION_FAILURE_MESSAGE.to_string(),
            ),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
