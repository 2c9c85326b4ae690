//! Metrics middleware for inbound events.
//!
//! Wraps each event in a `tracing` span and records `relay_events_total` and
//! `relay_event_duration_seconds` through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::error::StageError;
use crate::ingress::InboundEvent;
use crate::stage::StageResponse;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments events with timing and outcome.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer {
    stage: &'static str,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            stage: self.stage,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    stage: &'static str,
}

impl<S> Service<InboundEvent> for MetricsService<S>
where
    S: Service<InboundEvent, Response = StageResponse, Error = StageError> + Send,
    S::Future: Send + 'static,
{
    type Response = StageResponse;
    type Error = StageError;
    type Future = Pin<Box<dyn Future<Output = Result<StageResponse, StageError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, event: InboundEvent) -> Self::Future {
        let stage = self.stage;
        let span = info_span!(
            "stage_event",
            stage,
            request_id = %event.request_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(event);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(response) => response.outcome(),
                    Err(e) => e.classify().1,
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!("relay_events_total", "stage" => stage, "outcome" => outcome)
                    .increment(1);
                metrics::histogram!("relay_event_duration_seconds", "stage" => stage)
                    .record(elapsed.as_secs_f64());

                tracing::info!(stage, duration_ms, outcome, "event complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
