//! Startup selection of the reply writer.

use std::sync::Arc;

use relay_core::{ConfigSource, ConfigurationError, EventIdentity, WriterConfig, WriterMode};
use tracing::info;

use crate::publish::Publisher;
use crate::writer::{EventWriter, InlineReply, TopicPublish};

/// Resolves the process-wide [`WriterConfig`] and the matching [`EventWriter`].
pub struct ConfigSelector;

impl ConfigSelector {
    /// Reads the writer keys from `source` once and builds the writer.
    ///
    /// `publisher` is only consulted in topic mode; inline deployments may pass
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when topic mode is selected without a
    /// `PROJECT_ID` or without a publisher, when `TOPIC_ID` is malformed, or when
    /// the stage identity is not representable as reply headers. Callers treat
    /// this as fatal.
    pub fn resolve(
        source: &impl ConfigSource,
        identity: &EventIdentity,
        publisher: Option<Arc<dyn Publisher>>,
    ) -> Result<(WriterConfig, EventWriter), ConfigurationError> {
        let config = WriterConfig::resolve(source, identity)?;
        let writer = match config.mode {
            WriterMode::Inline => EventWriter::Inline(InlineReply::new(&config)?),
            WriterMode::Topic => EventWriter::Topic(TopicPublish::new(
                config.project_id.clone(),
                config.topics.clone(),
                publisher.ok_or(ConfigurationError::Unavailable("publisher"))?,
            )),
        };

        info!(
            mode = ?config.mode,
            topics = ?config.topics,
            event_type = %config.event_type,
            event_source = %config.event_source,
            "event writer selected"
        );
        Ok((config, writer))
    }
}
