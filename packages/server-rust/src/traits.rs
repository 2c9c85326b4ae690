use async_trait::async_trait;
use bytes::Bytes;
use relay_core::StorageRef;

/// Object storage holding stage inputs and derived outputs.
/// Implementations: Cloud Storage (REST), memory (tests, local runs).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object's full contents.
    async fn download(&self, object: &StorageRef) -> anyhow::Result<Bytes>;

    /// Upload (create or overwrite) an object.
    async fn upload(
        &self,
        object: &StorageRef,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()>;
}

/// Likelihood ratings returned by image safety classification, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Likelihood {
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

/// Safety classification of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeSearch {
    pub adult: Likelihood,
    pub medical: Likelihood,
    pub racy: Likelihood,
    pub spoof: Likelihood,
    pub violence: Likelihood,
}

impl SafeSearch {
    /// True when every category is rated below [`Likelihood::Possible`].
    #[must_use]
    pub fn is_safe(&self) -> bool {
        [self.adult, self.medical, self.racy, self.spoof, self.violence]
            .iter()
            .all(|l| *l < Likelihood::Possible)
    }
}

/// One label detected in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub description: String,
    pub score: f32,
}

/// Image understanding backend.
#[async_trait]
pub trait ImageAnnotator: Send + Sync {
    /// Classify the image at `image_uri` for unsafe content.
    async fn safe_search(&self, image_uri: &str) -> anyhow::Result<SafeSearch>;

    /// Detect up to `max_results` labels for the image at `image_uri`.
    async fn labels(&self, image_uri: &str, max_results: u32) -> anyhow::Result<Vec<Label>>;
}

/// Destination table for a query job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

/// Analytical query backend.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run `sql` with a single named string parameter, replacing `destination`
    /// with the result. Returns the job identifier.
    async fn run_into_table(
        &self,
        sql: &str,
        parameter: (&str, &str),
        destination: &TableRef,
    ) -> anyhow::Result<String>;
}

/// Result of one text translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub translated_text: String,
    /// Populated when the source language was auto-detected.
    pub detected_source_language: Option<String>,
}

/// Machine translation backend.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    /// Translate `text` into `target`, auto-detecting the source when `source` is `None`.
    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: Option<&str>,
    ) -> anyhow::Result<Translation>;
}
