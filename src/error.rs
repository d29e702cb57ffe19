//! Error type shared by the storage, publisher, workflow and REST layers.
//!
//! Client-facing variants carry the message returned in the `{"msg": ...}` body;
//! everything else collapses to a generic 500 with the detail kept in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = EnvironmentError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// Bad client input: missing fields, wrong types, duplicate names.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    /// A sibling service answered with something other than 200.
    #[error("{message}\nStatus code - {status}\npayload: {payload}")]
    Downstream {
        message: String,
        status: u16,
        payload: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to publish to topic {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

impl EnvironmentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Downstream { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Storage(_) | Self::Codec(_) | Self::Http(_) | Self::Publish { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for EnvironmentError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = if status.is_server_error() {
            tracing::error!(error = %self, "request failed with internal error");
            "Internal error while processing the request. Check logs for additional info".to_string()
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
            self.to_string()
        };
        (status, Json(json!({ "msg": msg }))).into_response()
    }
}
