//! Error types shared by the decoder and the configuration layer.

use thiserror::Error;

/// An inbound envelope could not be turned into a canonical payload.
///
/// Every variant is a property of the request alone; retrying the same envelope
/// always fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload for event type `{type_tag}` is not valid JSON: {detail}")]
    InvalidJson { type_tag: String, detail: String },

    #[error("payload for event type `{type_tag}` is missing field `{field}`")]
    MissingField {
        type_tag: String,
        field: &'static str,
    },

    #[error("field `{field}` is not valid base64: {detail}")]
    InvalidBase64 { field: &'static str, detail: String },

    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("audit log resource name `{resource_name}` does not match projects/_/buckets/<bucket>/objects/<name>")]
    MalformedResourceName { resource_name: String },

    #[error("envelope is missing required attribute `{0}`")]
    MissingAttribute(&'static str),

    #[error("structured envelope must be a JSON object: {0}")]
    MalformedEnvelope(String),
}

/// Startup configuration is missing or unusable. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("required configuration key `{0}` is not set")]
    Missing(&'static str),

    #[error("configuration key `{key}` has invalid value `{value}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0} is required by the configured mode but none is available")]
    Unavailable(&'static str),
}
