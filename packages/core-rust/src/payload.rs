//! Canonical business payloads and stage replies.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to an object in a storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRef {
    pub bucket: String,
    pub name: String,
}

impl StorageRef {
    #[must_use]
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// The `gs://bucket/name` form understood by the vision APIs.
    #[must_use]
    pub fn gs_url(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }

    /// Object file name without directories or extension (`dir/beach.jpg` -> `beach`).
    #[must_use]
    pub fn file_stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

/// Business value extracted from an envelope. Exactly one variant, always fully populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalPayload {
    /// A storage object reference.
    StorageRef(StorageRef),
    /// Free-form text (a country name, a translation request, ...).
    Text(String),
}

impl CanonicalPayload {
    /// Short variant name for logs and rejection messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StorageRef(_) => "storage_ref",
            Self::Text(_) => "text",
        }
    }
}

/// Structured reply produced by a stage after its domain operation.
///
/// Opaque to the relay beyond JSON serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPayload(Value);

impl ReplyPayload {
    /// Wraps an already-built JSON value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds a reply from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self)
    }

    /// Compact JSON bytes, as written to the reply body or the published message.
    ///
    /// # Errors
    ///
    /// Returns the serializer error (only possible for non-string map keys, which a
    /// `Value` cannot hold, so in practice this does not fail).
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl From<StorageRef> for ReplyPayload {
    fn from(reference: StorageRef) -> Self {
        Self(serde_json::json!({
            "bucket": reference.bucket,
            "name": reference.name,
        }))
    }
}
