//! Cloud Storage [`ObjectStore`] over the JSON API.

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use relay_core::StorageRef;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::debug;

use super::{encode_path_segment, ensure_success, GcpClient};
use crate::traits::ObjectStore;

/// Production endpoint.
pub const STORAGE_URL: &str = "https://storage.googleapis.com";

pub struct GcsObjectStore {
    client: GcpClient,
}

impl GcsObjectStore {
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

fn download_path(object: &StorageRef) -> String {
    format!(
        "/storage/v1/b/{}/o/{}",
        encode_path_segment(&object.bucket),
        encode_path_segment(&object.name)
    )
}

fn upload_path(object: &StorageRef) -> String {
    format!("/upload/storage/v1/b/{}/o", encode_path_segment(&object.bucket))
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn download(&self, object: &StorageRef) -> anyhow::Result<Bytes> {
        let response = self
            .client
            .request(Method::GET, &download_path(object))
            .await?
            .query(&[("alt", "media")])
            .send()
            .await
            .with_context(|| format!("downloading {object}"))?;
        let data = ensure_success(response, "object download")
            .await?
            .bytes()
            .await
            .with_context(|| format!("reading {object}"))?;
        debug!(%object, bytes = data.len(), "object downloaded");
        Ok(data)
    }

    async fn upload(
        &self,
        object: &StorageRef,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()> {
        let len = data.len();
        let response = self
            .client
            .request(Method::POST, &upload_path(object))
            .await?
            .query(&[("uploadType", "media"), ("name", object.name.as_str())])
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .with_context(|| format!("uploading {object}"))?;
        ensure_success(response, "object upload").await?;
        debug!(%object, bytes = len, "object uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_names_are_a_single_path_segment() {
        let object = StorageRef::new("images-in", "2024/beach.jpg");
        assert_eq!(download_path(&object), "/storage/v1/b/images-in/o/2024%2Fbeach.jpg");
        assert_eq!(upload_path(&object), "/upload/storage/v1/b/images-in/o");
    }
}
