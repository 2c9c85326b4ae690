//! In-memory [`ObjectStore`] implementation backed by [`DashMap`].

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use relay_core::StorageRef;

use crate::traits::ObjectStore;

/// A stored object with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

/// Objects keyed by `(bucket, name)`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<StorageRef, StoredObject>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object directly.
    pub fn insert(&self, object: StorageRef, content_type: &str, data: impl Into<Bytes>) {
        self.objects.insert(
            object,
            StoredObject {
                content_type: content_type.to_string(),
                data: data.into(),
            },
        );
    }

    /// Returns a copy of the stored object.
    #[must_use]
    pub fn get(&self, object: &StorageRef) -> Option<StoredObject> {
        self.objects.get(object).map(|o| o.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, object: &StorageRef) -> anyhow::Result<Bytes> {
        self.objects
            .get(object)
            .map(|o| o.data.clone())
            .ok_or_else(|| anyhow!("object {object} not found"))
    }

    async fn upload(
        &self,
        object: &StorageRef,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()> {
        self.insert(object.clone(), content_type, data);
        Ok(())
    }
}
