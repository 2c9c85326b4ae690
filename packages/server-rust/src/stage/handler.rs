//! Per-request orchestration: decode, invoke the domain operation, deliver the reply.
//!
//! State machine for one event:
//! `Received -> Decoding -> {DecodeFailed | Decoded} -> DomainOpInvoked ->
//! {DomainOpFailed | DomainOpSucceeded} -> Encoding -> {EncodeFailed | Replied}`.
//! No step is retried; redelivery belongs to the upstream transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower::Service;
use tracing::{error, info, warn};

use super::{Stage, StageOutcome};
use crate::error::StageError;
use crate::ingress::{EventReader, InboundEvent};
use crate::writer::{Delivery, EventWriter};

/// Successful end state of one event.
#[derive(Debug, Clone)]
pub enum StageResponse {
    /// The reply was delivered by the writer.
    Replied(Delivery),
    /// The stage completed without a reply.
    Done,
    /// The stage dropped the event on purpose.
    Filtered { reason: String },
}

impl StageResponse {
    /// Outcome label for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Replied(Delivery::Inline(_)) => "replied_inline",
            Self::Replied(Delivery::Published { .. }) => "published",
            Self::Done => "done",
            Self::Filtered { .. } => "filtered",
        }
    }
}

impl IntoResponse for StageResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Replied(Delivery::Inline(event)) => event.into_response(),
            Self::Replied(Delivery::Published { .. }) | Self::Done | Self::Filtered { .. } => {
                StatusCode::OK.into_response()
            }
        }
    }
}

/// Runs one stage behind the shared reader and writer.
pub struct StageHandler {
    stage: Arc<dyn Stage>,
    reader: EventReader,
    writer: EventWriter,
}

impl StageHandler {
    #[must_use]
    pub fn new(stage: Arc<dyn Stage>, reader: EventReader, writer: EventWriter) -> Self {
        Self {
            stage,
            reader,
            writer,
        }
    }

    #[must_use]
    pub fn stage_name(&self) -> &'static str {
        self.stage.name()
    }

    #[must_use]
    pub fn writer(&self) -> &EventWriter {
        &self.writer
    }

    /// Processes one inbound event to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the [`StageError`] of whichever step failed: decode, domain
    /// operation, reply encoding, or publish.
    pub async fn handle(&self, event: InboundEvent) -> Result<StageResponse, StageError> {
        let stage = self.stage.name();

        let (payload, ctx) = self.reader.read(&event).map_err(|e| {
            warn!(stage, request_id = %event.request_id, state = "decode_failed", "{e}");
            StageError::Decode(e)
        })?;
        info!(
            stage,
            request_id = %ctx.request_id,
            state = "decoded",
            kind = payload.kind(),
            event_type = %ctx.event_type,
            event_id = ctx.event_id.as_deref().unwrap_or_default(),
            event_source = ctx.event_source.as_deref().unwrap_or_default(),
            "payload decoded"
        );

        let outcome = self.stage.invoke(payload, &ctx).await.map_err(|e| {
            error!(
                stage,
                request_id = %ctx.request_id,
                state = "domain_op_failed",
                "{e:#}"
            );
            StageError::Domain(e)
        })?;

        match outcome {
            StageOutcome::Reply(reply) => {
                let delivery = self.writer.write(&reply, &ctx).await.map_err(|e| {
                    let (_, state) = e.classify();
                    error!(stage, request_id = %ctx.request_id, state, "{e}");
                    e
                })?;
                info!(stage, request_id = %ctx.request_id, state = "replied", "reply delivered");
                Ok(StageResponse::Replied(delivery))
            }
            StageOutcome::Done => {
                info!(stage, request_id = %ctx.request_id, state = "done", "completed without reply");
                Ok(StageResponse::Done)
            }
            StageOutcome::Filtered { reason } => {
                info!(stage, request_id = %ctx.request_id, state = "filtered", %reason, "event filtered");
                Ok(StageResponse::Filtered { reason })
            }
        }
    }
}

impl Service<InboundEvent> for Arc<StageHandler> {
    type Response = StageResponse;
    type Error = StageError;
    type Future = Pin<Box<dyn Future<Output = Result<StageResponse, StageError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: InboundEvent) -> Self::Future {
        let handler = Arc::clone(self);
        Box::pin(async move { handler.handle(event).await })
    }
}
