//! Load-shedding middleware for inbound events.
//!
//! Rejects events when the number in flight reaches `max_concurrent_events`
//! with `StageError::Overloaded`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::error::StageError;
use crate::ingress::InboundEvent;
use crate::stage::StageResponse;

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent events via a semaphore.
///
/// When all permits are taken, incoming events are rejected immediately rather
/// than queued, so the upstream transport can redeliver elsewhere.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<InboundEvent> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tracing::warn!(request_id = %event.request_id, "shedding event: at capacity");
            return Box::pin(async { Err(StageError::Overloaded) });
        };

        let fut = self.inner.call(event);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
