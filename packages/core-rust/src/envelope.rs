//! Inbound event envelopes.
//!
//! An [`Envelope`] is the transport-independent view of one inbound event: a type
//! tag, the undecoded payload bytes, and the remaining context attributes. It can
//! be built from a structured-mode JSON document or from binary-mode attribute
//! pairs (HTTP headers with the `ce-` prefix).

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::DecodeError;

/// Well-known event type tags recognised by the decoder.
pub mod event_types {
    /// Cloud Audit Log entry written.
    pub const AUDIT_LOG: &str = "google.cloud.audit.log.v1.written";
    /// Pre-GA audit log tag, still emitted by some older triggers.
    pub const AUDIT_LOG_LEGACY: &str = "com.google.cloud.auditlog.event";
    /// Message published to a Pub/Sub topic.
    pub const PUBSUB_PUBLISHED: &str = "google.cloud.pubsub.topic.v1.messagePublished";
    /// Cloud Scheduler job executed.
    pub const SCHEDULER_EXECUTED: &str = "google.cloud.scheduler.job.v1.executed";
    /// Cloud Storage object finalized.
    pub const STORAGE_FINALIZED: &str = "google.cloud.storage.object.v1.finalized";
}

/// Attribute name prefix used by binary-mode HTTP transport.
const BINARY_ATTRIBUTE_PREFIX: &str = "ce-";

/// Immutable, per-request event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Event type tag. Empty for untyped envelopes.
    pub type_tag: String,
    /// Undecoded payload bytes.
    pub raw_payload: Vec<u8>,
    /// Context attributes other than the type (`id`, `source`, `subject`, ...).
    /// Keys are lowercase.
    pub attributes: BTreeMap<String, String>,
}

impl Envelope {
    /// Creates an envelope with no attributes.
    #[must_use]
    pub fn new(type_tag: impl Into<String>, raw_payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag: type_tag.into(),
            raw_payload: raw_payload.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates an untyped envelope around a bare body. Decoded by the default branch.
    #[must_use]
    pub fn untyped(raw_payload: impl Into<Vec<u8>>) -> Self {
        Self::new(String::new(), raw_payload)
    }

    /// Adds a context attribute, lowercasing its name.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Parses a structured-mode envelope (a JSON object carrying attributes and data).
    ///
    /// `data` that is a JSON string contributes its text; any other JSON value
    /// contributes its compact serialization; `data_base64` contributes its
    /// decoded bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedEnvelope`] if the body is not a JSON object,
    /// [`DecodeError::InvalidBase64`] for a bad `data_base64`, and
    /// [`DecodeError::MissingAttribute`] if no `type` attribute is present.
    pub fn from_structured(body: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::MalformedEnvelope(
                "top-level value is not an object".to_string(),
            ));
        };

        let raw_payload = match (fields.remove("data_base64"), fields.remove("data")) {
            (Some(Value::String(encoded)), _) => {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| DecodeError::InvalidBase64 {
                        field: "data_base64",
                        detail: e.to_string(),
                    })?
            }
            (Some(_), _) => {
                return Err(DecodeError::InvalidBase64 {
                    field: "data_base64",
                    detail: "expected a string".to_string(),
                })
            }
            (None, Some(Value::String(text))) => text.into_bytes(),
            (None, None | Some(Value::Null)) => Vec::new(),
            (None, Some(other)) => other.to_string().into_bytes(),
        };

        let mut attributes = BTreeMap::new();
        for (name, value) in fields {
            let text = match value {
                Value::String(s) => s,
                Value::Null => continue,
                other => other.to_string(),
            };
            attributes.insert(name.to_ascii_lowercase(), text);
        }

        let type_tag = attributes
            .remove("type")
            .ok_or(DecodeError::MissingAttribute("type"))?;

        Ok(Self {
            type_tag,
            raw_payload,
            attributes,
        })
    }

    /// Builds a binary-mode envelope from header pairs and a body.
    ///
    /// Headers prefixed with `ce-` become attributes with the prefix stripped;
    /// `content-type` becomes `datacontenttype`; everything else is ignored. A missing
    /// `ce-type` yields an untyped envelope.
    pub fn from_binary<'a, I>(headers: I, body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut attributes = BTreeMap::new();
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            if let Some(attribute) = name.strip_prefix(BINARY_ATTRIBUTE_PREFIX) {
                attributes.insert(attribute.to_string(), value.to_string());
            } else if name == "content-type" {
                attributes.insert("datacontenttype".to_string(), value.to_string());
            }
        }
        let type_tag = attributes.remove("type").unwrap_or_default();

        Self {
            type_tag,
            raw_payload: body.into(),
            attributes,
        }
    }

    /// Returns an attribute by (lowercase) name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `id` attribute, if present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The `source` attribute, if present.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.attribute("source")
    }

    /// The `subject` attribute, if present.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.attribute("subject")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_object_data_is_serialized_compactly() {
        let body = br#"{
            "specversion": "1.0",
            "type": "google.cloud.storage.object.v1.finalized",
            "source": "//storage.googleapis.com/projects/_/buckets/b1",
            "id": "42",
            "data": {"bucket": "b1", "name": "o1.jpg"}
        }"#;

        let envelope = Envelope::from_structured(body).unwrap();
        assert_eq!(envelope.type_tag, event_types::STORAGE_FINALIZED);
        assert_eq!(envelope.id(), Some("42"));
        assert_eq!(envelope.attribute("specversion"), Some("1.0"));
        assert!(envelope.attribute("type").is_none());

        let data: Value = serde_json::from_slice(&envelope.raw_payload).unwrap();
        assert_eq!(data["bucket"], "b1");
        assert_eq!(data["name"], "o1.jpg");
    }

    #[test]
    fn structured_string_data_is_taken_verbatim() {
        let body = br#"{"type":"custom","data":"{\"bucket\":\"b\",\"name\":\"n\"}"}"#;
        let envelope = Envelope::from_structured(body).unwrap();
        assert_eq!(envelope.raw_payload, br#"{"bucket":"b","name":"n"}"#.to_vec());
    }

    #[test]
    fn structured_data_base64_is_decoded() {
        let body = br#"{"type":"custom","data_base64":"aGVsbG8="}"#;
        let envelope = Envelope::from_structured(body).unwrap();
        assert_eq!(envelope.raw_payload, b"hello".to_vec());
    }

    #[test]
    fn structured_without_data_has_empty_payload() {
        let envelope = Envelope::from_structured(br#"{"type":"t","data":null}"#).unwrap();
        assert!(envelope.raw_payload.is_empty());
    }

    #[test]
    fn structured_requires_type() {
        let err = Envelope::from_structured(br#"{"id":"1","data":{}}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingAttribute("type"));
    }

    #[test]
    fn structured_rejects_non_object() {
        let err = Envelope::from_structured(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));

        let err = Envelope::from_structured(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn structured_rejects_bad_base64() {
        let err = Envelope::from_structured(br#"{"type":"t","data_base64":"@@@"}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidBase64 {
                field: "data_base64",
                ..
            }
        ));
    }

    #[test]
    fn binary_headers_become_attributes() {
        let headers = [
            ("Ce-Id", "abc"),
            ("ce-type", event_types::STORAGE_FINALIZED),
            ("Ce-Source", "src"),
            ("Content-Type", "application/json"),
            ("x-request-id", "ignored"),
        ];
        let envelope = Envelope::from_binary(headers, b"{}".to_vec());

        assert_eq!(envelope.type_tag, event_types::STORAGE_FINALIZED);
        assert_eq!(envelope.id(), Some("abc"));
        assert_eq!(envelope.source(), Some("src"));
        assert_eq!(envelope.attribute("datacontenttype"), Some("application/json"));
        assert!(envelope.attribute("x-request-id").is_none());
    }

    #[test]
    fn binary_without_type_is_untyped() {
        let envelope = Envelope::from_binary([("ce-id", "1")], b"{}".to_vec());
        assert!(envelope.type_tag.is_empty());
    }

    #[test]
    fn with_attribute_lowercases_name() {
        let envelope = Envelope::untyped(Vec::new()).with_attribute("Subject", "objects/a.jpg");
        assert_eq!(envelope.subject(), Some("objects/a.jpg"));
    }
}
