//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared resources, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. The listener is bound before
//! serving so the caller learns the actual port (tests bind port 0).

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    event_handler, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::pipeline::StagePipeline;

/// Manages the HTTP server lifecycle for one stage.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    pipeline: StagePipeline,
    stage: &'static str,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, stage: &'static str, pipeline: StagePipeline) -> Self {
        Self {
            config,
            listener: None,
            pipeline,
            stage,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `POST /` -- event ingress
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pipeline: self.pipeline.clone(),
            stage: self.stage,
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/", post(event_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            // The body cap is enforced by `RequestBodyLimitLayer`.
            .layer(DefaultBodyLimit::disable())
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(stage = self.stage, "TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves events until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining and new events get 503
    /// 2. In-flight events get up to `drain_timeout` to finish
    /// 3. Health state transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a fatal
    /// I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let shutdown_ctrl = self.shutdown;
        let drain_timeout = self.config.drain_timeout;

        shutdown_ctrl.set_ready();
        info!(stage = self.stage, "serving events");

        let ctrl = Arc::clone(&shutdown_ctrl);
        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                ctrl.trigger_shutdown();
            })
            .into_future();

        // Bounds how long open connections may hold up exit once draining.
        let mut signalled = shutdown_ctrl.shutdown_receiver();
        let drain_deadline = async move {
            if signalled.wait_for(|triggered| *triggered).await.is_ok() {
                tokio::time::sleep(drain_timeout).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = server => result?,
            () = drain_deadline => warn!("drain timeout expired; closing remaining connections"),
        }

        if shutdown_ctrl.wait_for_drain(drain_timeout).await {
            info!("all in-flight events drained");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "drain timeout expired with events in flight"
            );
        }
        Ok(())
    }
}
