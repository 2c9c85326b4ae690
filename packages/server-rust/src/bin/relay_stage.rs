//! Process entry point: runs one relay stage behind the HTTP host.

use std::process::ExitCode;

use clap::Parser;
use relay_core::EnvSource;
use relay_server::app::{self, Collaborators};
use relay_server::config::{init_tracing, ServerArgs};
use relay_server::network::NetworkModule;
use relay_server::pipeline::build_stage_pipeline;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args = ServerArgs::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if app::is_configuration_error(&e) {
                error!("invalid configuration: {e:#}");
            } else {
                error!("fatal: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ServerArgs) -> anyhow::Result<()> {
    if let Some(port) = args.metrics_port {
        app::install_metrics_exporter(port)?;
    }

    let deps = Collaborators::google(&args)?;
    let handler = app::build_handler(args.stage, &EnvSource, &deps)?;
    let stage = handler.stage_name();
    let pipeline = build_stage_pipeline(handler, args.max_concurrent_events);

    let mut module = NetworkModule::new(args.network_config(), stage, pipeline);
    let port = module.start().await?;
    info!(stage, port, "relay stage started");

    module.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
