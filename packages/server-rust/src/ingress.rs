//! Inbound request reading: HTTP headers and body into a canonical payload.

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use bytes::Bytes;
use relay_core::{decode, CanonicalPayload, DecodeError, Envelope, EventReaderKind, RequestContext};
use tracing::info;

/// Content type that marks a structured-mode envelope.
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// One inbound HTTP request as seen by the stage pipeline.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub request_id: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Reads inbound requests according to the configured [`EventReaderKind`].
#[derive(Debug, Clone, Copy)]
pub struct EventReader {
    kind: EventReaderKind,
}

impl EventReader {
    #[must_use]
    pub fn new(kind: EventReaderKind) -> Self {
        Self { kind }
    }

    #[must_use]
    pub fn kind(&self) -> EventReaderKind {
        self.kind
    }

    /// Turns `event` into a canonical payload and its request context.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the envelope cannot be parsed or decoded, or, for
    /// raw-body reading, if the body is not UTF-8.
    pub fn read(
        &self,
        event: &InboundEvent,
    ) -> Result<(CanonicalPayload, RequestContext), DecodeError> {
        match self.kind {
            EventReaderKind::HttpPost => {
                let text = std::str::from_utf8(&event.body)
                    .map_err(|_| DecodeError::InvalidUtf8 { field: "body" })?;
                info!(request_id = %event.request_id, bytes = text.len(), "received raw body");
                Ok((
                    CanonicalPayload::Text(text.to_string()),
                    RequestContext::new(event.request_id.clone()),
                ))
            }
            EventReaderKind::CloudEvent => {
                let envelope = envelope_from_http(&event.headers, &event.body)?;
                info!(
                    request_id = %event.request_id,
                    event_id = envelope.id().unwrap_or_default(),
                    event_type = %envelope.type_tag,
                    source = envelope.source().unwrap_or_default(),
                    subject = envelope.subject().unwrap_or_default(),
                    bytes = envelope.raw_payload.len(),
                    "received event"
                );
                let ctx = RequestContext {
                    request_id: event.request_id.clone(),
                    event_id: envelope.id().map(str::to_string),
                    event_type: envelope.type_tag.clone(),
                    event_source: envelope.source().map(str::to_string),
                };
                let payload = decode(&envelope)?;
                Ok((payload, ctx))
            }
        }
    }
}

/// Builds an envelope from an HTTP request.
///
/// A structured content type selects structured mode; otherwise the `ce-*` headers
/// (possibly none, giving an untyped envelope) and the body form a binary-mode one.
///
/// # Errors
///
/// Returns [`DecodeError`] for a malformed structured envelope.
pub fn envelope_from_http(headers: &HeaderMap, body: &Bytes) -> Result<Envelope, DecodeError> {
    let structured = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(STRUCTURED_CONTENT_TYPE))
        });

    if structured {
        return Envelope::from_structured(body);
    }

    let pairs = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));
    Ok(Envelope::from_binary(pairs, body.to_vec()))
}
