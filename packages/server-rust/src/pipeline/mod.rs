//! Tower middleware around the stage handler.
//!
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`metrics`]: Event timing and outcome counting

pub mod load_shed;
pub mod metrics;

use std::sync::Arc;

use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;

use crate::error::StageError;
use crate::ingress::InboundEvent;
use crate::stage::{StageHandler, StageResponse};

/// The type-erased event pipeline shared by the HTTP handler.
pub type StagePipeline = BoxCloneSyncService<InboundEvent, StageResponse, StageError>;

/// Wraps `handler` with the middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer`: reject when overloaded, before any work
/// 2. `MetricsLayer`: record timing and outcome of admitted events
#[must_use]
pub fn build_stage_pipeline(handler: Arc<StageHandler>, max_concurrent: u32) -> StagePipeline {
    let stage = handler.stage_name();
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(LoadShedLayer::new(max_concurrent))
            .layer(MetricsLayer::new(stage))
            .service(handler),
    )
}
