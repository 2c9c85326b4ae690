//! Cloud Vision [`ImageAnnotator`] over `images:annotate`.

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ensure_success, GcpClient};
use crate::traits::{ImageAnnotator, Label, Likelihood, SafeSearch};

/// Production endpoint.
pub const VISION_URL: &str = "https://vision.googleapis.com";

const ANNOTATE_PATH: &str = "/v1/images:annotate";

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    safe_search_annotation: Option<SafeSearchAnnotation>,
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SafeSearchAnnotation {
    #[serde(default)]
    adult: WireLikelihood,
    #[serde(default)]
    medical: WireLikelihood,
    #[serde(default)]
    racy: WireLikelihood,
    #[serde(default)]
    spoof: WireLikelihood,
    #[serde(default)]
    violence: WireLikelihood,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireLikelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl From<WireLikelihood> for Likelihood {
    fn from(value: WireLikelihood) -> Self {
        match value {
            WireLikelihood::Unknown => Self::Unknown,
            WireLikelihood::VeryUnlikely => Self::VeryUnlikely,
            WireLikelihood::Unlikely => Self::Unlikely,
            WireLikelihood::Possible => Self::Possible,
            WireLikelihood::Likely => Self::Likely,
            WireLikelihood::VeryLikely => Self::VeryLikely,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
}

pub struct VisionClient {
    client: GcpClient,
}

impl VisionClient {
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    async fn annotate(&self, image_uri: &str, feature: Value) -> anyhow::Result<ImageResponse> {
        let body = json!({
            "requests": [{
                "image": { "source": { "imageUri": image_uri } },
                "features": [feature],
            }]
        });
        let response = self
            .client
            .request(Method::POST, ANNOTATE_PATH)
            .await?
            .json(&body)
            .send()
            .await
            .context("calling images:annotate")?;
        let parsed: AnnotateResponse = ensure_success(response, "image annotation")
            .await?
            .json()
            .await
            .context("parsing annotation response")?;
        let first = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(error) = first.error {
            return Err(anyhow!("annotation of {image_uri} failed: {error}"));
        }
        Ok(first)
    }
}

#[async_trait]
impl ImageAnnotator for VisionClient {
    async fn safe_search(&self, image_uri: &str) -> anyhow::Result<SafeSearch> {
        let response = self
            .annotate(image_uri, json!({ "type": "SAFE_SEARCH_DETECTION" }))
            .await?;
        let annotation = response
            .safe_search_annotation
            .ok_or_else(|| anyhow!("no safe search annotation for {image_uri}"))?;
        Ok(SafeSearch {
            adult: annotation.adult.into(),
            medical: annotation.medical.into(),
            racy: annotation.racy.into(),
            spoof: annotation.spoof.into(),
            violence: annotation.violence.into(),
        })
    }

    async fn labels(&self, image_uri: &str, max_results: u32) -> anyhow::Result<Vec<Label>> {
        let response = self
            .annotate(
                image_uri,
                json!({ "type": "LABEL_DETECTION", "maxResults": max_results }),
            )
            .await?;
        Ok(response
            .label_annotations
            .into_iter()
            .map(|l| Label {
                description: l.description,
                score: l.score,
            })
            .collect())
    }
}
