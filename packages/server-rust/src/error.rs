//! Request-path error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::DecodeError;
use serde_json::json;
use thiserror::Error;

/// The stage's external domain operation failed.
#[derive(Debug, Error)]
pub enum DomainOperationError {
    /// The input is well-formed but unusable by this stage (wrong payload variant,
    /// failed validation). Redelivery will not help.
    #[error("{0}")]
    Rejected(String),

    /// The collaborator call itself failed.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Delivery to a configured topic failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to open publish channel for topic `{topic}`: {detail}")]
    Connect { topic: String, detail: String },

    #[error("publish to topic `{topic}` rejected with status {status}: {detail}")]
    Rejected {
        topic: String,
        status: u16,
        detail: String,
    },

    #[error("publish to topic `{topic}` failed: {detail}")]
    Transport { topic: String, detail: String },

    #[error("publish channel for topic `{topic}` did not drain within {grace_ms}ms")]
    DrainTimeout { topic: String, grace_ms: u64 },
}

impl PublishError {
    /// Topic the failure belongs to.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Connect { topic, .. }
            | Self::Rejected { topic, .. }
            | Self::Transport { topic, .. }
            | Self::DrainTimeout { topic, .. } => topic,
        }
    }
}

/// Terminal failure of one event through a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("domain operation failed: {0}")]
    Domain(#[from] DomainOperationError),

    #[error("reply encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("too many events in flight")]
    Overloaded,
}

impl StageError {
    /// Status code and machine-readable error code for the HTTP response.
    #[must_use]
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Decode(_) => (StatusCode::BAD_REQUEST, "decode_failed"),
            Self::Domain(DomainOperationError::Rejected(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "rejected")
            }
            Self::Domain(DomainOperationError::Failed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "domain_operation_failed")
            }
            Self::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_failed"),
            Self::Publish(_) => (StatusCode::BAD_GATEWAY, "publish_failed"),
            Self::Overloaded => (StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
        }
    }
}

impl IntoResponse for StageError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        let reason = match &self {
            Self::Decode(e) => e.to_string(),
            Self::Domain(e) => format!("{e:#}"),
            Self::Encode(e) => e.to_string(),
            Self::Publish(e) => e.to_string(),
            Self::Overloaded => self.to_string(),
        };
        (status, Json(json!({ "error": code, "reason": reason }))).into_response()
    }
}
