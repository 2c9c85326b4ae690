//! Content filter: passes an uploaded image on only if it is rated safe.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use relay_core::{CanonicalPayload, ReplyPayload, RequestContext};
use tracing::info;

use super::{expect_storage_ref, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::ImageAnnotator;

pub struct FilterStage {
    annotator: Arc<dyn ImageAnnotator>,
    /// When set, events for other buckets are dropped.
    expected_bucket: Option<String>,
}

impl FilterStage {
    #[must_use]
    pub fn new(annotator: Arc<dyn ImageAnnotator>, expected_bucket: Option<String>) -> Self {
        Self {
            annotator,
            expected_bucket: expected_bucket.filter(|b| !b.is_empty()),
        }
    }
}

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError> {
        let input = expect_storage_ref(self.name(), payload)?;

        if let Some(expected) = &self.expected_bucket {
            if *expected != input.bucket {
                return Ok(StageOutcome::Filtered {
                    reason: format!("bucket `{}` is not `{expected}`", input.bucket),
                });
            }
        }

        let rating = self
            .annotator
            .safe_search(&input.gs_url())
            .await
            .with_context(|| format!("classifying {input}"))?;
        info!(request_id = %ctx.request_id, object = %input, ?rating, "safe search complete");

        if !rating.is_safe() {
            return Ok(StageOutcome::Filtered {
                reason: format!("{input} may contain unsafe content"),
            });
        }
        Ok(StageOutcome::Reply(ReplyPayload::from(input)))
    }
}

#[cfg(test)]
mod tests {
    use relay_core::StorageRef;

    use super::*;
    use crate::traits::{Label, Likelihood, SafeSearch};

    struct FixedRating(Likelihood);

    #[async_trait]
    impl ImageAnnotator for FixedRating {
        async fn safe_search(&self, image_uri: &str) -> anyhow::Result<SafeSearch> {
            assert!(image_uri.starts_with("gs://"));
            Ok(SafeSearch {
                adult: Likelihood::VeryUnlikely,
                medical: Likelihood::VeryUnlikely,
                racy: self.0,
                spoof: Likelihood::Unlikely,
                violence: Likelihood::Unknown,
            })
        }

        async fn labels(&self, _image_uri: &str, _max: u32) -> anyhow::Result<Vec<Label>> {
            Ok(Vec::new())
        }
    }

    fn upload(bucket: &str) -> CanonicalPayload {
        CanonicalPayload::StorageRef(StorageRef::new(bucket, "cat.jpg"))
    }

    #[tokio::test]
    async fn safe_image_is_passed_on_unchanged() {
        let stage = FilterStage::new(Arc::new(FixedRating(Likelihood::Unlikely)), None);
        let outcome = stage.invoke(upload("in"), &RequestContext::new("r")).await.unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Reply(ReplyPayload::from(StorageRef::new("in", "cat.jpg")))
        );
    }

    #[tokio::test]
    async fn possible_rating_is_filtered() {
        let stage = FilterStage::new(Arc::new(FixedRating(Likelihood::Possible)), None);
        let outcome = stage.invoke(upload("in"), &RequestContext::new("r")).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Filtered { .. }));
    }

    #[tokio::test]
    async fn other_bucket_is_filtered_before_classification() {
        let stage = FilterStage::new(
            Arc::new(FixedRating(Likelihood::Unlikely)),
            Some("in".to_string()),
        );
        let outcome = stage.invoke(upload("elsewhere"), &RequestContext::new("r")).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Filtered { ref reason } if reason.contains("elsewhere")));

        let outcome = stage.invoke(upload("in"), &RequestContext::new("r")).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Reply(_)));
    }
}
