//! Inline reply: the stage's reply travels back in the triggering HTTP response.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use relay_core::{ConfigurationError, ReplyPayload, RequestContext, WriterConfig};
use tracing::info;
use uuid::Uuid;

use super::Delivery;
use crate::error::StageError;

/// `specversion` stamped on every reply.
pub const SPEC_VERSION: &str = "1.0";
/// Content type of reply bodies.
pub const REPLY_CONTENT_TYPE: &str = "application/json;charset=utf-8";

pub const CE_ID: HeaderName = HeaderName::from_static("ce-id");
pub const CE_SPECVERSION: HeaderName = HeaderName::from_static("ce-specversion");
pub const CE_TYPE: HeaderName = HeaderName::from_static("ce-type");
pub const CE_SOURCE: HeaderName = HeaderName::from_static("ce-source");

/// Writes replies as binary-mode events in the HTTP response.
#[derive(Debug, Clone)]
pub struct InlineReply {
    event_type: HeaderValue,
    event_source: HeaderValue,
}

impl InlineReply {
    /// Builds the writer, validating that the configured identity can be sent as headers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] if the event type or source
    /// contains characters not allowed in an HTTP header value.
    pub fn new(config: &WriterConfig) -> Result<Self, ConfigurationError> {
        let header = |key: &'static str, value: &str| {
            HeaderValue::from_str(value).map_err(|_| ConfigurationError::InvalidValue {
                key,
                value: value.to_string(),
                reason: "not a valid header value",
            })
        };
        Ok(Self {
            event_type: header("event_type", &config.event_type)?,
            event_source: header("event_source", &config.event_source)?,
        })
    }

    /// Serializes `reply` into a reply event with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Encode`] if the reply cannot be serialized.
    pub fn write(
        &self,
        reply: &ReplyPayload,
        ctx: &RequestContext,
    ) -> Result<Delivery, StageError> {
        let body = reply.to_json_bytes()?;
        let event = ReplyEvent {
            id: Uuid::new_v4().to_string(),
            event_type: self.event_type.clone(),
            event_source: self.event_source.clone(),
            body: Bytes::from(body),
        };
        info!(
            request_id = %ctx.request_id,
            reply_id = %event.id,
            reply_type = ?event.event_type,
            bytes = event.body.len(),
            "replying inline"
        );
        Ok(Delivery::Inline(event))
    }
}

/// A reply event ready to be written to the HTTP response.
#[derive(Debug, Clone)]
pub struct ReplyEvent {
    id: String,
    event_type: HeaderValue,
    event_source: HeaderValue,
    body: Bytes,
}

impl ReplyEvent {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl IntoResponse for ReplyEvent {
    fn into_response(self) -> Response {
        // A v4 UUID is always a valid header value.
        let id = HeaderValue::from_str(&self.id).unwrap_or(HeaderValue::from_static("unknown"));
        (
            StatusCode::OK,
            [
                (CE_ID, id),
                (CE_SPECVERSION, HeaderValue::from_static(SPEC_VERSION)),
                (CE_TYPE, self.event_type),
                (CE_SOURCE, self.event_source),
                (CONTENT_TYPE, HeaderValue::from_static(REPLY_CONTENT_TYPE)),
            ],
            self.body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use relay_core::WriterMode;
    use serde_json::json;

    use super::*;

    fn config() -> WriterConfig {
        WriterConfig {
            mode: WriterMode::Inline,
            topics: Vec::new(),
            project_id: String::new(),
            event_source: "urn:example/resizer".to_string(),
            event_type: "dev.example.resized".to_string(),
        }
    }

    fn write(reply: &ReplyPayload) -> ReplyEvent {
        let writer = InlineReply::new(&config()).unwrap();
        match writer.write(reply, &RequestContext::new("req-1")).unwrap() {
            Delivery::Inline(event) => event,
            Delivery::Published { .. } => panic!("inline writer published"),
        }
    }

    #[tokio::test]
    async fn response_has_exact_event_headers_and_body() {
        let reply = ReplyPayload::new(json!({"bucket": "b", "name": "n"}));
        let response = write(&reply).into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        let ce_headers: Vec<_> = headers
            .keys()
            .filter(|k| k.as_str().starts_with("ce-"))
            .collect();
        assert_eq!(ce_headers.len(), 4);
        assert!(!headers["ce-id"].is_empty());
        assert_eq!(headers["ce-specversion"], "1.0");
        assert_eq!(headers["ce-type"], "dev.example.resized");
        assert_eq!(headers["ce-source"], "urn:example/resizer");
        assert_eq!(headers["content-type"], REPLY_CONTENT_TYPE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], reply.to_json_bytes().unwrap().as_slice());
    }

    #[test]
    fn every_reply_gets_a_fresh_id() {
        let reply = ReplyPayload::new(json!({}));
        assert_ne!(write(&reply).id(), write(&reply).id());
    }

    #[test]
    fn invalid_identity_is_a_configuration_error() {
        let mut bad = config();
        bad.event_type = "line\nbreak".to_string();
        let err = InlineReply::new(&bad).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue {
                key: "event_type",
                ..
            }
        ));
    }
}
