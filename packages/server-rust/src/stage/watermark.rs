//! Watermark stage: stamps a caption across an image and stores a JPEG copy.
//!
//! The caption is scaled to fill the image (less a small padding) and centred.
//! No reply is produced; downstream consumers watch the output bucket.

use std::io::Cursor;
use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb};
use imageproc::drawing::{draw_text_mut, text_size};
use relay_core::{CanonicalPayload, RequestContext, StorageRef};
use tracing::info;

use super::{expect_storage_ref, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::ObjectStore;

/// Caption drawn on every image.
pub const WATERMARK_TEXT: &str = "Google Cloud Platform";

/// DeepSkyBlue.
const WATERMARK_COLOR: Rgb<u8> = Rgb([0, 191, 255]);
const PADDING: u32 = 5;
/// Size the caption is measured at before scaling to fit.
const BASE_SCALE: f32 = 10.0;

static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Loads the font shipped with the binary.
///
/// # Errors
///
/// Returns an error if the bundled font data cannot be parsed.
pub fn bundled_font() -> anyhow::Result<FontArc> {
    FontArc::try_from_slice(BUNDLED_FONT).map_err(|e| anyhow!("loading bundled font: {e}"))
}

pub struct WatermarkStage {
    store: Arc<dyn ObjectStore>,
    output_bucket: String,
    font: FontArc,
}

impl WatermarkStage {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, output_bucket: impl Into<String>, font: FontArc) -> Self {
        Self {
            store,
            output_bucket: output_bucket.into(),
            font,
        }
    }

    /// Name of the watermarked copy written for `input`.
    #[must_use]
    pub fn output_for(&self, input: &StorageRef) -> StorageRef {
        StorageRef::new(
            self.output_bucket.clone(),
            format!("{}-watermark.jpeg", input.file_stem()),
        )
    }
}

#[async_trait]
impl Stage for WatermarkStage {
    fn name(&self) -> &'static str {
        "watermark"
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

        let font = self.font.clone();
        let stamped = tokio::task::spawn_blocking(move || {
            watermark_to_jpeg(&original, &font, WATERMARK_TEXT)
        })
        .await
        .context("watermark task aborted")??;

        let output = self.output_for(&input);
        self.store
            .upload(&output, "image/jpeg", stamped)
            .await
            .with_context(|| format!("uploading {output}"))?;
        info!(request_id = %ctx.request_id, object = %output, "uploaded watermarked image");

        Ok(StageOutcome::Done)
    }
}

/// Draws `text` centred over `data`, scaled to fill it, and encodes the result as JPEG.
///
/// # Errors
///
/// Returns [`DomainOperationError::Rejected`] if `data` is not a supported image and
/// [`DomainOperationError::Failed`] if encoding fails.
pub fn watermark_to_jpeg(
    data: &[u8],
    font: &FontArc,
    text: &str,
) -> Result<Bytes, DomainOperationError> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| DomainOperationError::Rejected(format!("unsupported image: {e}")))?;
    let mut canvas = decoded.to_rgb8();
    let (width, height) = canvas.dimensions();

    if let Some(scale) = fitted_scale(width, height, font, text) {
        let (text_w, text_h) = text_size(scale, font, text);
        let x = (i64::from(width) - i64::from(text_w)) / 2;
        let y = (i64::from(height) - i64::from(text_h)) / 2;
        draw_text_mut(
            &mut canvas,
            WATERMARK_COLOR,
            i32::try_from(x).unwrap_or(0),
            i32::try_from(y).unwrap_or(0),
            scale,
            font,
            text,
        );
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut out, ImageFormat::Jpeg)
        .context("encoding watermarked image as JPEG")?;
    Ok(Bytes::from(out.into_inner()))
}

/// Scale at which `text` fills `width` x `height` less padding, or `None` when
/// there is no room or the text has no extent.
#[allow(clippy::cast_precision_loss)]
fn fitted_scale(width: u32, height: u32, font: &FontArc, text: &str) -> Option<PxScale> {
    let target_w = width.saturating_sub(PADDING * 2);
    let target_h = height.saturating_sub(PADDING * 2);
    let (base_w, base_h) = text_size(PxScale::from(BASE_SCALE), font, text);
    if target_w == 0 || target_h == 0 || base_w == 0 || base_h == 0 {
        return None;
    }
    let factor = f32::min(
        target_w as f32 / base_w as f32,
        target_h as f32 / base_h as f32,
    );
    Some(PxScale::from(BASE_SCALE * factor))
}
