//! Process-wide relay configuration.
//!
//! Values are read through a [`ConfigSource`] exactly once at startup and frozen
//! into immutable structs. Nothing here is consulted per request.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Configuration keys understood by the relay.
pub mod keys {
    /// Cloud project identifier; required in topic mode.
    pub const PROJECT_ID: &str = "PROJECT_ID";
    /// Presence selects topic mode; `:` separates multiple topics.
    pub const TOPIC_ID: &str = "TOPIC_ID";
    /// Destination (or expected source) bucket for storage stages.
    pub const BUCKET: &str = "BUCKET";
    /// Inbound read strategy override.
    pub const EVENT_READER: &str = "EVENT_READER";
}

/// Separator between topic ids in `TOPIC_ID`.
pub const TOPIC_SEPARATOR: char = ':';

// ---------------------------------------------------------------------------
// ConfigSource
// ---------------------------------------------------------------------------

/// Key/value lookup backing startup configuration.
pub trait ConfigSource {
    /// Returns the raw value for `key`, or `None` when unset.
    fn get(&self, key: &str) -> Option<String>;

    /// Returns a value that must be present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Missing`] when the key is unset or empty.
    fn require(&self, key: &'static str) -> Result<String, ConfigurationError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigurationError::Missing(key))
    }
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| (*v).to_string())
    }
}

// ---------------------------------------------------------------------------
// Writer configuration
// ---------------------------------------------------------------------------

/// How a stage's reply leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// Reply in the HTTP response of the triggering request.
    Inline,
    /// Publish to one or more message topics.
    Topic,
}

/// Type and source stamped on replies produced by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdentity {
    pub event_type: String,
    pub event_source: String,
}

impl EventIdentity {
    #[must_use]
    pub fn new(event_type: impl Into<String>, event_source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            event_source: event_source.into(),
        }
    }
}

/// Writer strategy settings, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub mode: WriterMode,
    /// Topics in publish order. Empty in inline mode.
    pub topics: Vec<String>,
    /// Empty in inline mode.
    pub project_id: String,
    pub event_source: String,
    pub event_type: String,
}

impl WriterConfig {
    /// Resolves the writer configuration from `source`.
    ///
    /// An unset `TOPIC_ID` selects inline mode. Any value, whatever its content,
    /// selects topic mode and makes `PROJECT_ID` mandatory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Missing`] when topic mode lacks `PROJECT_ID`,
    /// and [`ConfigurationError::InvalidValue`] when `TOPIC_ID` contains an empty
    /// topic id.
    pub fn resolve(
        source: &impl ConfigSource,
        identity: &EventIdentity,
    ) -> Result<Self, ConfigurationError> {
        let Some(topic_value) = source.get(keys::TOPIC_ID) else {
            return Ok(Self {
                mode: WriterMode::Inline,
                topics: Vec::new(),
                project_id: String::new(),
                event_source: identity.event_source.clone(),
                event_type: identity.event_type.clone(),
            });
        };

        let project_id = source.require(keys::PROJECT_ID)?;
        let topics = parse_topics(&topic_value)?;

        Ok(Self {
            mode: WriterMode::Topic,
            topics,
            project_id,
            event_source: identity.event_source.clone(),
            event_type: identity.event_type.clone(),
        })
    }
}

fn parse_topics(value: &str) -> Result<Vec<String>, ConfigurationError> {
    let topics: Vec<String> = value
        .split(TOPIC_SEPARATOR)
        .map(str::trim)
        .map(str::to_string)
        .collect();

    if topics.iter().any(String::is_empty) {
        return Err(ConfigurationError::InvalidValue {
            key: keys::TOPIC_ID,
            value: value.to_string(),
            reason: "topic ids must be non-empty",
        });
    }
    Ok(topics)
}

// ---------------------------------------------------------------------------
// Event reader selection
// ---------------------------------------------------------------------------

/// Inbound read strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventReaderKind {
    /// Structured or binary envelope, decoded by type tag.
    #[default]
    CloudEvent,
    /// Raw request body taken as text.
    HttpPost,
}

impl FromStr for EventReaderKind {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cloudevent" | "CloudEvent" | "cloud_event" => Ok(Self::CloudEvent),
            "http-post" | "HttpPost" | "http_post" => Ok(Self::HttpPost),
            _ => Err(ConfigurationError::InvalidValue {
                key: keys::EVENT_READER,
                value: value.to_string(),
                reason: "expected `cloudevent` or `http-post`",
            }),
        }
    }
}

impl EventReaderKind {
    /// Reads `EVENT_READER`, defaulting to [`EventReaderKind::CloudEvent`] when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] for an unrecognised value.
    pub fn resolve(source: &impl ConfigSource) -> Result<Self, ConfigurationError> {
        source
            .get(keys::EVENT_READER)
            .map_or(Ok(Self::default()), |value| value.parse())
    }
}
