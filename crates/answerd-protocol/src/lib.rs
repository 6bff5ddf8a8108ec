//! Wire types for the `POST /process-query` endpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No query provided")]
    MissingQuery,
}

/// Incoming request body: `{"query": "..."}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// Absent and empty queries are rejected. Whitespace-only text is a valid query.
    pub fn into_query(self) -> Result<Query, ProtocolError> {
        match self.query {
            Some(text) if !text.is_empty() => Ok(Query(text)),
            _ => Err(ProtocolError::MissingQuery),
        }
    }
}

/// A caller question that passed validation; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        QueryRequest::new(text).into_query()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl From<ProtocolError> for ErrorResponse {
    fn from(err: ProtocolError) -> Self {
        Self::new(err.to_string())
    }
}
