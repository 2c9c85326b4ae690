//! Startup wiring: collaborators, the selected stage, and its handler.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use relay_core::config::keys;
use relay_core::{ConfigSource, ConfigurationError, EventReaderKind};
use tracing::info;

use crate::config::ServerArgs;
use crate::gcp::{self, GcpClient, MetadataToken, NoAuth, TokenProvider};
use crate::ingress::EventReader;
use crate::publish::Publisher;
use crate::selector::ConfigSelector;
use crate::stage::{
    FilterStage, LabelStage, QueryStage, ResizeStage, Stage, StageHandler, StageKind,
    TranslateStage, WatermarkStage,
};
use crate::traits::{ImageAnnotator, ObjectStore, QueryEngine, TranslationApi};

/// External services available to stages. Each stage takes only what it needs;
/// a missing collaborator is a startup error.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub store: Option<Arc<dyn ObjectStore>>,
    pub annotator: Option<Arc<dyn ImageAnnotator>>,
    pub query: Option<Arc<dyn QueryEngine>>,
    pub translation: Option<Arc<dyn TranslationApi>>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl Collaborators {
    /// Google Cloud REST clients, honoring emulator overrides in `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn google(args: &ServerArgs) -> anyhow::Result<Self> {
        let metadata: Arc<dyn TokenProvider> = Arc::new(MetadataToken::new());
        let client = |emulator: Option<&String>, production: &str| -> anyhow::Result<GcpClient> {
            match emulator {
                Some(host) => GcpClient::new(gcp::emulator_url(host), Arc::new(NoAuth)),
                None => GcpClient::new(production, Arc::clone(&metadata)),
            }
        };

        Ok(Self {
            store: Some(Arc::new(gcp::GcsObjectStore::new(client(
                args.storage_emulator_host.as_ref(),
                gcp::storage::STORAGE_URL,
            )?))),
            annotator: Some(Arc::new(gcp::VisionClient::new(client(
                None,
                gcp::vision::VISION_URL,
            )?))),
            query: Some(Arc::new(gcp::BigQueryClient::new(client(
                None,
                gcp::bigquery::BIGQUERY_URL,
            )?))),
            translation: Some(Arc::new(gcp::TranslateClient::new(client(
                None,
                gcp::translate::TRANSLATE_URL,
            )?))),
            publisher: Some(Arc::new(gcp::PubSubPublisher::new(client(
                args.pubsub_emulator_host.as_ref(),
                gcp::pubsub::PUBSUB_URL,
            )?))),
        })
    }
}

fn need<T: ?Sized>(collaborator: Option<&Arc<T>>, what: &str) -> anyhow::Result<Arc<T>> {
    collaborator
        .cloned()
        .ok_or_else(|| anyhow!("no {what} configured"))
}

/// Builds the stage selected by `kind`, reading its business keys from `source`.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] (inside the `anyhow` error) for missing or
/// invalid keys, or an error for a missing collaborator.
pub fn build_stage(
    kind: StageKind,
    source: &impl ConfigSource,
    deps: &Collaborators,
) -> anyhow::Result<Arc<dyn Stage>> {
    let stage: Arc<dyn Stage> = match kind {
        StageKind::Resize => Arc::new(ResizeStage::new(
            need(deps.store.as_ref(), "object store")?,
            source.require(keys::BUCKET)?,
        )),
        StageKind::Filter => Arc::new(FilterStage::new(
            need(deps.annotator.as_ref(), "image annotator")?,
            source.get(keys::BUCKET),
        )),
        StageKind::Label => Arc::new(LabelStage::new(
            need(deps.annotator.as_ref(), "image annotator")?,
            need(deps.store.as_ref(), "object store")?,
            source.require(keys::BUCKET)?,
        )),
        StageKind::Query => Arc::new(QueryStage::new(
            need(deps.query.as_ref(), "query engine")?,
            source.require(keys::PROJECT_ID)?,
        )),
        StageKind::Translate => Arc::new(TranslateStage::new(need(
            deps.translation.as_ref(),
            "translation api",
        )?)),
        StageKind::Watermark => Arc::new(WatermarkStage::new(
            need(deps.store.as_ref(), "object store")?,
            source.require(keys::BUCKET)?,
            crate::stage::watermark::bundled_font()?,
        )),
    };
    Ok(stage)
}

/// Resolves the reader, stage, and writer once and combines them.
///
/// # Errors
///
/// Fails on any startup configuration problem; the caller treats it as fatal.
pub fn build_handler(
    kind: StageKind,
    source: &impl ConfigSource,
    deps: &Collaborators,
) -> anyhow::Result<Arc<StageHandler>> {
    let reader = EventReader::new(EventReaderKind::resolve(source)?);
    let stage = build_stage(kind, source, deps)?;

    let (_, writer) = ConfigSelector::resolve(source, &kind.identity(), deps.publisher.clone())?;

    info!(stage = stage.name(), reader = ?reader.kind(), mode = ?writer.mode(), "stage assembled");
    Ok(Arc::new(StageHandler::new(stage, reader, writer)))
}

/// Whether `err` came from the business configuration keys.
#[must_use]
pub fn is_configuration_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ConfigurationError>().is_some()
}

/// Installs the Prometheus exporter on `port`.
///
/// # Errors
///
/// Returns an error if the listener cannot be installed.
pub fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("installing Prometheus exporter")?;
    info!(port, "metrics exporter listening");
    Ok(())
}
