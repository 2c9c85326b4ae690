//! Processing stages.
//!
//! A stage is one deployable unit: it receives a decoded [`CanonicalPayload`], runs
//! a single domain operation against external collaborators, and optionally
//! produces a [`ReplyPayload`]. Decoding and reply delivery are shared and live in
//! [`handler::StageHandler`].

pub mod filter;
pub mod handler;
pub mod label;
pub mod query;
pub mod resize;
pub mod translate;
pub mod watermark;

use async_trait::async_trait;
use clap::ValueEnum;
use relay_core::{CanonicalPayload, EventIdentity, ReplyPayload, RequestContext, StorageRef};

use crate::error::DomainOperationError;

pub use filter::FilterStage;
pub use handler::{StageHandler, StageResponse};
pub use label::LabelStage;
pub use query::QueryStage;
pub use resize::ResizeStage;
pub use translate::TranslateStage;
pub use watermark::WatermarkStage;

/// What a stage produced for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Deliver this reply through the configured writer.
    Reply(ReplyPayload),
    /// Work done; nothing to deliver.
    Done,
    /// The event was deliberately dropped (bucket mismatch, unsafe content).
    Filtered { reason: String },
}

/// One domain operation behind the shared decode/encode layer.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs the domain operation for one decoded event.
    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError>;
}

/// The deployable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageKind {
    Resize,
    Filter,
    Label,
    Query,
    Translate,
    Watermark,
}

impl StageKind {
    /// Type and source stamped on this stage's replies.
    #[must_use]
    pub fn identity(self) -> EventIdentity {
        let (event_type, event_source) = match self {
            Self::Resize => (
                "dev.knative.samples.fileresized",
                "urn:knative/eventing/samples/resizer",
            ),
            Self::Filter => (
                "dev.knative.samples.fileuploaded",
                "urn:knative/eventing/samples/filter",
            ),
            Self::Label => (
                "dev.knative.samples.filelabeled",
                "urn:knative/eventing/samples/labeler",
            ),
            Self::Query => (
                "dev.knative.samples.querycompleted",
                "urn:knative/eventing/samples/queryrunner",
            ),
            Self::Translate => (
                "dev.knative.samples.translated",
                "urn:knative/eventing/samples/translator",
            ),
            Self::Watermark => (
                "dev.knative.samples.filewatermarked",
                "urn:knative/eventing/samples/watermarker",
            ),
        };
        EventIdentity::new(event_type, event_source)
    }
}

/// Extracts the storage reference a stage needs, rejecting text payloads.
pub(crate) fn expect_storage_ref(
    stage: &'static str,
    payload: CanonicalPayload,
) -> Result<StorageRef, DomainOperationError> {
    match payload {
        CanonicalPayload::StorageRef(reference) => Ok(reference),
        other @ CanonicalPayload::Text(_) => Err(DomainOperationError::Rejected(format!(
            "{stage} stage expects a storage reference, got {}",
            other.kind()
        ))),
    }
}

/// Extracts the text a stage needs, rejecting storage references.
pub(crate) fn expect_text(
    stage: &'static str,
    payload: CanonicalPayload,
) -> Result<String, DomainOperationError> {
    match payload {
        CanonicalPayload::Text(text) => Ok(text),
        other @ CanonicalPayload::StorageRef(_) => Err(DomainOperationError::Rejected(format!(
            "{stage} stage expects text, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct() {
        let kinds = [
            StageKind::Resize,
            StageKind::Filter,
            StageKind::Label,
            StageKind::Query,
            StageKind::Translate,
            StageKind::Watermark,
        ];
        let mut types: Vec<_> = kinds.iter().map(|k| k.identity().event_type).collect();
        types.sort();
        types.dedup();
        assert_eq!(types.len(), kinds.len());
    }

    #[test]
    fn payload_variant_mismatch_is_rejected() {
        let err = expect_storage_ref("resize", CanonicalPayload::Text("x".into())).unwrap_err();
        assert!(matches!(err, DomainOperationError::Rejected(ref m) if m.contains("resize")));

        let err = expect_text("query", CanonicalPayload::StorageRef(StorageRef::new("b", "n")))
            .unwrap_err();
        assert!(matches!(err, DomainOperationError::Rejected(_)));
    }
}
