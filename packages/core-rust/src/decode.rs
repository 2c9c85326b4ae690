//! Envelope decoding: type-tag dispatch into a [`CanonicalPayload`].
//!
//! Each recognised type tag has its own typed data shape; anything else falls back
//! to a flat `{"bucket": .., "name": ..}` object. Decoding is a pure function of
//! the envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::envelope::{event_types, Envelope};
use crate::error::DecodeError;
use crate::payload::{CanonicalPayload, StorageRef};

// ---------------------------------------------------------------------------
// Typed data shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditLogData {
    proto_payload: Option<AuditLogProtoPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditLogProtoPayload {
    resource_name: Option<String>,
}

#[derive(Deserialize)]
struct ObjectData {
    bucket: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct MessagePublishedData {
    message: Option<PubsubMessage>,
}

#[derive(Deserialize)]
struct PubsubMessage {
    data: Option<String>,
}

#[derive(Deserialize)]
struct SchedulerJobData {
    #[serde(alias = "customData")]
    custom_data: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decodes an envelope into its canonical payload.
///
/// Dispatch on the exact, case-sensitive type tag:
/// - audit log: `protoPayload.resourceName` split into bucket and object name
/// - storage finalized: `bucket` / `name` fields
/// - Pub/Sub published: base64 `message.data`; a JSON object with `bucket` / `name`
///   yields a storage reference, anything else yields the decoded text
/// - scheduler executed: base64 `custom_data` as text
/// - anything else: a flat JSON object with `bucket` / `name`
///
/// # Errors
///
/// Returns [`DecodeError`] when the payload does not have the shape implied by the
/// type tag.
pub fn decode(envelope: &Envelope) -> Result<CanonicalPayload, DecodeError> {
    let type_tag = envelope.type_tag.as_str();
    let payload = match type_tag {
        event_types::AUDIT_LOG | event_types::AUDIT_LOG_LEGACY => decode_audit_log(envelope)?,
        event_types::STORAGE_FINALIZED => {
            let data: ObjectData = parse_json(type_tag, &envelope.raw_payload)?;
            CanonicalPayload::StorageRef(storage_ref(type_tag, data)?)
        }
        event_types::PUBSUB_PUBLISHED => decode_pubsub(envelope)?,
        event_types::SCHEDULER_EXECUTED => {
            let data: SchedulerJobData = parse_json(type_tag, &envelope.raw_payload)?;
            let encoded = data.custom_data.ok_or_else(|| DecodeError::MissingField {
                type_tag: type_tag.to_string(),
                field: "custom_data",
            })?;
            CanonicalPayload::Text(decode_base64_text("custom_data", &encoded)?)
        }
        _ => {
            let data: ObjectData = parse_json(type_tag, &envelope.raw_payload)?;
            CanonicalPayload::StorageRef(storage_ref(type_tag, data)?)
        }
    };

    debug!(type_tag, kind = payload.kind(), "decoded envelope");
    Ok(payload)
}

fn decode_audit_log(envelope: &Envelope) -> Result<CanonicalPayload, DecodeError> {
    let type_tag = envelope.type_tag.as_str();
    let data: AuditLogData = parse_json(type_tag, &envelope.raw_payload)?;
    let resource_name = data
        .proto_payload
        .and_then(|p| p.resource_name)
        .ok_or_else(|| DecodeError::MissingField {
            type_tag: type_tag.to_string(),
            field: "protoPayload.resourceName",
        })?;

    parse_resource_name(&resource_name).map(CanonicalPayload::StorageRef)
}

/// Splits `projects/_/buckets/<bucket>/objects/<name>`.
///
/// Fewer than six segments, or a layout other than the one above, is an error.
/// Segments past the sixth belong to the object name, which may contain `/`.
fn parse_resource_name(resource_name: &str) -> Result<StorageRef, DecodeError> {
    let malformed = || DecodeError::MalformedResourceName {
        resource_name: resource_name.to_string(),
    };

    let segments: Vec<&str> = resource_name.splitn(6, '/').collect();
    let [projects, _project, buckets, bucket, objects, name] = segments.as_slice() else {
        return Err(malformed());
    };
    if *projects != "projects" || *buckets != "buckets" || *objects != "objects" {
        return Err(malformed());
    }
    if bucket.is_empty() || name.is_empty() {
        return Err(malformed());
    }

    Ok(StorageRef::new(*bucket, *name))
}

fn decode_pubsub(envelope: &Envelope) -> Result<CanonicalPayload, DecodeError> {
    let type_tag = envelope.type_tag.as_str();
    let data: MessagePublishedData = parse_json(type_tag, &envelope.raw_payload)?;
    let encoded = data
        .message
        .and_then(|m| m.data)
        .ok_or_else(|| DecodeError::MissingField {
            type_tag: type_tag.to_string(),
            field: "message.data",
        })?;
    let text = decode_base64_text("message.data", &encoded)?;

    // Only a JSON object with both fields counts as a storage reference; any other
    // text, JSON or not, is passed on verbatim.
    if let Ok(ObjectData {
        bucket: Some(bucket),
        name: Some(name),
    }) = serde_json::from_str::<ObjectData>(&text)
    {
        if !bucket.is_empty() && !name.is_empty() {
            return Ok(CanonicalPayload::StorageRef(StorageRef { bucket, name }));
        }
    }
    Ok(CanonicalPayload::Text(text))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_json<T: DeserializeOwned>(type_tag: &str, raw: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(raw).map_err(|e| DecodeError::InvalidJson {
        type_tag: type_tag.to_string(),
        detail: e.to_string(),
    })
}

fn storage_ref(type_tag: &str, data: ObjectData) -> Result<StorageRef, DecodeError> {
    let missing = |field| DecodeError::MissingField {
        type_tag: type_tag.to_string(),
        field,
    };
    let bucket = data.bucket.filter(|b| !b.is_empty()).ok_or_else(|| missing("bucket"))?;
    let name = data.name.filter(|n| !n.is_empty()).ok_or_else(|| missing("name"))?;
    Ok(StorageRef { bucket, name })
}

fn decode_base64_text(field: &'static str, encoded: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64 {
            field,
            detail: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn b64(text: &str) -> String {
        STANDARD.encode(text)
    }

    fn storage(bucket: &str, name: &str) -> CanonicalPayload {
        CanonicalPayload::StorageRef(StorageRef::new(bucket, name))
    }

    #[test]
    fn decodes_table_of_known_envelopes() {
        let pubsub_data = format!(
            r#"{{"message":{{"data":"{}"}},"subscription":"projects/p/subscriptions/s"}}"#,
            b64(r#"{"bucket":"b1","name":"o1.jpg"}"#)
        );
        let scheduler_data = format!(r#"{{"custom_data":"{}"}}"#, b64("France"));

        let cases = vec![
            (
                Envelope::new(
                    event_types::AUDIT_LOG,
                    r#"{"protoPayload":{"resourceName":"projects/_/buckets/b1/objects/o1.jpg"}}"#,
                ),
                storage("b1", "o1.jpg"),
            ),
            (
                Envelope::new(
                    event_types::STORAGE_FINALIZED,
                    r#"{"bucket":"b1","name":"o1.jpg","size":"12"}"#,
                ),
                storage("b1", "o1.jpg"),
            ),
            (
                Envelope::new(event_types::PUBSUB_PUBLISHED, pubsub_data),
                storage("b1", "o1.jpg"),
            ),
            (
                Envelope::new(event_types::SCHEDULER_EXECUTED, scheduler_data),
                CanonicalPayload::Text("France".to_string()),
            ),
            (
                Envelope::untyped(r#"{"bucket":"b1","name":"o1.jpg"}"#),
                storage("b1", "o1.jpg"),
            ),
        ];

        for (envelope, expected) in cases {
            assert_eq!(
                decode(&envelope).unwrap(),
                expected,
                "type tag {:?}",
                envelope.type_tag
            );
        }
    }

    #[test]
    fn legacy_audit_log_tag_is_decoded() {
        let envelope = Envelope::new(
            event_types::AUDIT_LOG_LEGACY,
            r#"{"protoPayload":{"resourceName":"projects/_/buckets/b1/objects/o1.jpg"}}"#,
        );
        assert_eq!(decode(&envelope).unwrap(), storage("b1", "o1.jpg"));
    }

    #[test]
    fn audit_log_with_too_few_segments_fails() {
        for resource in ["projects/_/buckets/b1/objects", "projects/_/buckets/b1", "", "a/b/c/d/e"] {
            let data = format!(r#"{{"protoPayload":{{"resourceName":"{resource}"}}}}"#);
            let err = decode(&Envelope::new(event_types::AUDIT_LOG, data)).unwrap_err();
            assert!(
                matches!(err, DecodeError::MalformedResourceName { .. }),
                "resource {resource:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn audit_log_with_unexpected_layout_fails() {
        let data = r#"{"protoPayload":{"resourceName":"projects/_/tables/b1/rows/o1"}}"#;
        let err = decode(&Envelope::new(event_types::AUDIT_LOG, data)).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedResourceName { .. }));
    }

    #[test]
    fn audit_log_keeps_nested_object_names() {
        let data =
            r#"{"protoPayload":{"resourceName":"projects/_/buckets/b1/objects/in/2020/o1.jpg"}}"#;
        let payload = decode(&Envelope::new(event_types::AUDIT_LOG, data)).unwrap();
        assert_eq!(payload, storage("b1", "in/2020/o1.jpg"));
    }

    #[test]
    fn audit_log_without_resource_name_fails() {
        let err = decode(&Envelope::new(event_types::AUDIT_LOG, r#"{"protoPayload":{}}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField {
                field: "protoPayload.resourceName",
                ..
            }
        ));
    }

    #[test]
    fn pubsub_plain_text_becomes_text() {
        let data = format!(r#"{{"message":{{"data":"{}"}}}}"#, b64("Cyprus"));
        let payload = decode(&Envelope::new(event_types::PUBSUB_PUBLISHED, data)).unwrap();
        assert_eq!(payload, CanonicalPayload::Text("Cyprus".to_string()));
    }

    #[test]
    fn pubsub_json_without_storage_fields_becomes_text() {
        let inner = r#"{"text":"hello","to":"fr"}"#;
        let data = format!(r#"{{"message":{{"data":"{}"}}}}"#, b64(inner));
        let payload = decode(&Envelope::new(event_types::PUBSUB_PUBLISHED, data)).unwrap();
        assert_eq!(payload, CanonicalPayload::Text(inner.to_string()));
    }

    #[test]
    fn pubsub_with_bad_base64_fails() {
        let data = r#"{"message":{"data":"not base64!"}}"#;
        let err = decode(&Envelope::new(event_types::PUBSUB_PUBLISHED, data)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidBase64 {
                field: "message.data",
                ..
            }
        ));
    }

    #[test]
    fn pubsub_with_non_utf8_data_fails() {
        let data = format!(r#"{{"message":{{"data":"{}"}}}}"#, STANDARD.encode([0xff, 0xfe]));
        let err = decode(&Envelope::new(event_types::PUBSUB_PUBLISHED, data)).unwrap_err();
        assert_eq!(err, DecodeError::InvalidUtf8 { field: "message.data" });
    }

    #[test]
    fn pubsub_without_message_fails() {
        let err = decode(&Envelope::new(event_types::PUBSUB_PUBLISHED, "{}")).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "message.data", .. }));
    }

    #[test]
    fn scheduler_text_is_not_json_parsed() {
        let encoded = b64(r#"{"bucket":"b1","name":"o1.jpg"}"#);
        let data = format!(r#"{{"customData":"{encoded}"}}"#);
        let payload = decode(&Envelope::new(event_types::SCHEDULER_EXECUTED, data)).unwrap();
        assert_eq!(
            payload,
            CanonicalPayload::Text(r#"{"bucket":"b1","name":"o1.jpg"}"#.to_string())
        );
    }

    #[test]
    fn storage_finalized_requires_both_fields() {
        let err = decode(&Envelope::new(event_types::STORAGE_FINALIZED, r#"{"bucket":"b1"}"#))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "name", .. }));

        let err = decode(&Envelope::new(
            event_types::STORAGE_FINALIZED,
            r#"{"bucket":"","name":"n"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "bucket", .. }));
    }

    #[test]
    fn default_branch_rejects_non_json() {
        let err = decode(&Envelope::new("dev.example.custom", "France")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { .. }));
    }

    #[test]
    fn type_tags_are_case_sensitive() {
        // An upper-cased audit-log tag falls through to the default branch,
        // which requires the flat bucket/name shape.
        let envelope = Envelope::new(
            "GOOGLE.CLOUD.AUDIT.LOG.V1.WRITTEN",
            r#"{"protoPayload":{"resourceName":"projects/_/buckets/b1/objects/o1.jpg"}}"#,
        );
        let err = decode(&envelope).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "bucket", .. }));
    }

    proptest! {
        #[test]
        fn decode_is_idempotent(type_idx in 0usize..5, raw in ".{0,64}") {
            let tags = [
                event_types::AUDIT_LOG,
                event_types::STORAGE_FINALIZED,
                event_types::PUBSUB_PUBLISHED,
                event_types::SCHEDULER_EXECUTED,
                "",
            ];
            let envelope = Envelope::new(tags[type_idx], raw);
            let snapshot = envelope.clone();
            let first = decode(&envelope);
            let second = decode(&envelope);
            prop_assert_eq!(first, second);
            prop_assert_eq!(envelope, snapshot);
        }

        #[test]
        fn arbitrary_resource_names_never_panic(resource in "[a-z_/]{0,40}") {
            let data = serde_json::json!({"protoPayload": {"resourceName": resource}}).to_string();
            let result = decode(&Envelope::new(event_types::AUDIT_LOG, data));
            if let Ok(CanonicalPayload::StorageRef(reference)) = result {
                prop_assert!(!reference.bucket.is_empty());
                prop_assert!(!reference.name.is_empty());
            }
        }
    }
}
