//! Process flags and logging setup.

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::network::{NetworkConfig, DEFAULT_MAX_BODY_BYTES};
use crate::stage::StageKind;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runs one event relay stage.
#[derive(Debug, Clone, Parser)]
#[command(name = "relay-stage", version, about = "Event relay stage", long_about = None)]
pub struct ServerArgs {
    /// Stage this process runs.
    #[arg(long, env = "STAGE", value_enum)]
    pub stage: StageKind,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Events processed concurrently before new ones are answered with 503.
    #[arg(long, env = "MAX_CONCURRENT_EVENTS", default_value_t = 1000)]
    pub max_concurrent_events: u32,

    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// `host:port` of a Pub/Sub emulator; disables authentication for publishing.
    #[arg(long, env = "PUBSUB_EMULATOR_HOST")]
    pub pubsub_emulator_host: Option<String>,

    /// `host:port` of a Cloud Storage emulator; disables authentication for storage.
    #[arg(long, env = "STORAGE_EMULATOR_HOST")]
    pub storage_emulator_host: Option<String>,
}

impl ServerArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            max_body_bytes: self.max_body_bytes,
            max_concurrent_events: self.max_concurrent_events,
            ..NetworkConfig::default()
        }
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter. A subscriber that is already installed is kept.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let args = ServerArgs::try_parse_from(["relay-stage", "--stage", "resize"]).unwrap();
        assert_eq!(args.stage, StageKind::Resize);
        assert_eq!(args.log_format, LogFormat::Text);
        assert_eq!(args.max_concurrent_events, 1000);
        assert_eq!(args.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(args.metrics_port.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = ServerArgs::try_parse_from([
            "relay-stage",
            "--stage",
            "translate",
            "--port",
            "9000",
            "--log-format",
            "json",
            "--max-concurrent-events",
            "5",
        ])
        .unwrap();
        assert_eq!(args.stage, StageKind::Translate);
        let network = args.network_config();
        assert_eq!(network.port, 9000);
        assert_eq!(network.max_concurrent_events, 5);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn repeated_tracing_init_keeps_first_subscriber() {
        init_tracing(LogFormat::Json);
        init_tracing(LogFormat::Text);
        tracing::info!("still logging");
    }

    #[test]
    fn watermark_stage_is_selectable() {
        let args = ServerArgs::try_parse_from(["relay-stage", "--stage", "watermark"]).unwrap();
        assert_eq!(args.stage, StageKind::Watermark);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert!(ServerArgs::try_parse_from(["relay-stage", "--stage", "sharpen"]).is_err());
    }
}
