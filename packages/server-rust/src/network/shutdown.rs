//! Graceful shutdown controller with in-flight event tracking.
//!
//! Uses `ArcSwap` for lock-free health state transitions and a
//! [`DrainTracker`] for in-flight accounting.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::drain::{DrainGuard, DrainTracker};

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Server is initializing (not yet accepting events).
    Starting,
    /// Server is accepting events.
    Ready,
    /// Shutdown was requested; in-flight events are finishing.
    Draining,
    /// Every in-flight event has completed.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates graceful shutdown across the server:
/// 1. Health probes check `health_state()` to report readiness
/// 2. The event handler holds an `in_flight_guard()` per event
/// 3. `trigger_shutdown()` moves to Draining and signals all listeners
/// 4. `wait_for_drain()` waits until in-flight events complete
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    tracker: DrainTracker,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            tracker: DrainTracker::new(),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Transitions to `Draining` and signals all shutdown receivers.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        // Receivers may have been dropped.
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Tracks one in-flight event until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> DrainGuard {
        self.tracker.guard()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.tracker.in_flight()
    }

    /// Waits for all in-flight events to complete, up to `timeout`.
    ///
    /// Returns `true` and transitions to `Stopped` on success; returns `false`
    /// and stays `Draining` if the timeout expired.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = self.tracker.wait_idle(timeout).await;
        if drained {
            self.health_state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
