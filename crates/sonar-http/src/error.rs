//! API error mapping
//!
//! Every error leaves the API as a JSON body `{code, error, message}` with a
//! matching HTTP status.

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use sonar_core::RegistryError;
use sonar_discovery::DiscoveryError;
use thiserror::Error;
use tracing::error;

/// Errors returned by query API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire form of an [`ApiError`]
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn agent_not_found(agent_id: impl Into<String>) -> Self {
        Self::AgentNotFound {
            agent_id: agent_id.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidJson(_) | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::AgentNotFound { .. } => "agent_not_found",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::InvalidQuery(_) => "invalid_query",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AgentNotFound { agent_id } => Self::AgentNotFound { agent_id },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Registry(inner) => inner.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidQuery(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            error: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
