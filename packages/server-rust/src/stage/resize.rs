//! Thumbnail stage: downloads an image, resizes it, and stores a PNG copy.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageFormat;
use relay_core::{CanonicalPayload, ReplyPayload, RequestContext, StorageRef};
use tracing::info;

use super::{expect_storage_ref, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::ObjectStore;

/// Default thumbnail edge length in pixels.
pub const THUMBNAIL_SIZE: u32 = 400;

pub struct ResizeStage {
    store: Arc<dyn ObjectStore>,
    output_bucket: String,
    width: u32,
    height: u32,
}

impl ResizeStage {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, output_bucket: impl Into<String>) -> Self {
        Self {
            store,
            output_bucket: output_bucket.into(),
            width: THUMBNAIL_SIZE,
            height: THUMBNAIL_SIZE,
        }
    }

    /// Name of the thumbnail written for `input`.
    #[must_use]
    pub fn output_for(&self, input: &StorageRef) -> StorageRef {
        StorageRef::new(
            self.output_bucket.clone(),
            format!("{}-{}x{}.png", input.file_stem(), self.width, self.height),
        )
    }
}

#[async_trait]
impl Stage for ResizeStage {
    fn name(&self) -> &'static str {
        "resize"
    }

    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError> {
        let input = expect_storage_ref(self.name(), payload)?;

        let original = self
            .store
            .download(&input)
            .await
            .with_context(|| format!("downloading {input}"))?;
        info!(request_id = %ctx.request_id, object = %input, bytes = original.len(), "downloaded image");

        let (width, height) = (self.width, self.height);
        let thumbnail = tokio::task::spawn_blocking(move || resize_to_png(&original, width, height))
            .await
            .context("resize task aborted")??;

        let output = self.output_for(&input);
        self.store
            .upload(&output, "image/png", thumbnail)
            .await
            .with_context(|| format!("uploading {output}"))?;
        info!(request_id = %ctx.request_id, object = %output, "uploaded thumbnail");

        Ok(StageOutcome::Reply(ReplyPayload::from(output)))
    }
}

/// Stretches `data` to exactly `width` x `height` and encodes it as PNG.
///
/// # Errors
///
/// Returns [`DomainOperationError::Rejected`] if `data` is not a supported image and
/// [`DomainOperationError::Failed`] if encoding fails.
pub fn resize_to_png(data: &[u8], width: u32, height: u32) -> Result<Bytes, DomainOperationError> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| DomainOperationError::Rejected(format!("unsupported image: {e}")))?;
    let resized = decoded.resize_exact(width, height, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, ImageFormat::Png)
        .context("encoding thumbnail as PNG")?;
    Ok(Bytes::from(out.into_inner()))
}
