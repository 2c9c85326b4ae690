//! Labeling stage: detects image labels and stores them as a text object.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use relay_core::{CanonicalPayload, RequestContext, StorageRef};
use tracing::info;

use super::{expect_storage_ref, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::{ImageAnnotator, Label, ObjectStore};

/// Labels requested from the annotator.
pub const MAX_LABELS: u32 = 10;
/// The highest-scoring labels that are always kept.
const ALWAYS_KEEP: usize = 3;
/// Further labels are kept while their score exceeds this.
const MIN_EXTRA_SCORE: f32 = 0.5;

pub struct LabelStage {
    annotator: Arc<dyn ImageAnnotator>,
    store: Arc<dyn ObjectStore>,
    output_bucket: String,
}

impl LabelStage {
    #[must_use]
    pub fn new(
        annotator: Arc<dyn ImageAnnotator>,
        store: Arc<dyn ObjectStore>,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            annotator,
            store,
            output_bucket: output_bucket.into(),
        }
    }
}

/// Orders labels by descending score and keeps the top few plus every
/// confident one that follows.
#[must_use]
pub fn rank_labels(mut labels: Vec<Label>) -> Vec<String> {
    labels.sort_by(|a, b| b.score.total_cmp(&a.score));
    labels
        .into_iter()
        .enumerate()
        .take_while(|(i, label)| *i < ALWAYS_KEEP || label.score > MIN_EXTRA_SCORE)
        .map(|(_, label)| label.description)
        .collect()
}

#[async_trait]
impl Stage for LabelStage {
    fn name(&self) -> &'static str {
        "label"
    }

    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError> {
        let input = expect_storage_ref(self.name(), payload)?;

        let labels = self
            .annotator
            .labels(&input.gs_url(), MAX_LABELS)
            .await
            .with_context(|| format!("labeling {input}"))?;
        let kept = rank_labels(labels);
        info!(request_id = %ctx.request_id, object = %input, labels = ?kept, "labels detected");

        let output = StorageRef::new(
            self.output_bucket.clone(),
            format!("{}-labels.txt", input.file_stem()),
        );
        self.store
            .upload(&output, "text/plain", Bytes::from(kept.join(",")))
            .await
            .with_context(|| format!("uploading {output}"))?;
        info!(request_id = %ctx.request_id, object = %output, "stored labels");

        Ok(StageOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use crate::traits::SafeSearch;

    fn label(description: &str, score: f32) -> Label {
        Label {
            description: description.to_string(),
            score,
        }
    }

    #[test]
    fn keeps_top_three_even_when_weak() {
        let ranked = rank_labels(vec![label("a", 0.2), label("b", 0.4), label("c", 0.1), label("d", 0.05)]);
        assert_eq!(ranked, vec!["b", "a", "c"]);
    }

    #[test]
    fn keeps_confident_labels_after_top_three() {
        let ranked = rank_labels(vec![
            label("sky", 0.95),
            label("sea", 0.9),
            label("sand", 0.85),
            label("beach", 0.7),
            label("cloud", 0.45),
            label("boat", 0.6),
        ]);
        // Stops at the first label at or below the threshold.
        assert_eq!(ranked, vec!["sky", "sea", "sand", "beach", "boat"]);
    }

    #[test]
    fn fewer_than_three_labels() {
        assert_eq!(rank_labels(vec![label("x", 0.1)]), vec!["x"]);
        assert!(rank_labels(Vec::new()).is_empty());
    }

    struct Fixed(Vec<Label>);

    #[async_trait]
    impl ImageAnnotator for Fixed {
        async fn safe_search(&self, _image_uri: &str) -> anyhow::Result<SafeSearch> {
            anyhow::bail!("not used")
        }

        async fn labels(&self, _image_uri: &str, max_results: u32) -> anyhow::Result<Vec<Label>> {
            assert_eq!(max_results, MAX_LABELS);
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn writes_comma_separated_labels() {
        let store = Arc::new(MemoryObjectStore::new());
        let stage = LabelStage::new(
            Arc::new(Fixed(vec![label("dog", 0.9), label("grass", 0.8)])),
            store.clone(),
            "labels-out",
        );

        let outcome = stage
            .invoke(
                CanonicalPayload::StorageRef(StorageRef::new("in", "pets/dog.jpg")),
                &RequestContext::new("r"),
            )
            .await
            .unwrap();

        assert_eq!(outcome, StageOutcome::Done);
        let stored = store.get(&StorageRef::new("labels-out", "dog-labels.txt")).unwrap();
        assert_eq!(stored.content_type, "text/plain");
        assert_eq!(&stored.data[..], b"dog,grass");
    }
}
