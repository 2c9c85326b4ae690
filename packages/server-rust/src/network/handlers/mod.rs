//! HTTP handler definitions for the relay host.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! re-exports the handler functions used when building the router.

pub mod event;
pub mod health;

pub use event::event_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::pipeline::StagePipeline;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and a cloneable service so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The stage behind its middleware layers.
    pub pipeline: StagePipeline,
    /// Name of the stage this process runs.
    pub stage: &'static str,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, used for uptime calculation.
    pub start_time: Instant,
}
