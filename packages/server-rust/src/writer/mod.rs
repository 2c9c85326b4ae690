//! Outbound event writers.
//!
//! [`EventWriter`] is a closed set of strategies chosen once at startup by
//! [`crate::selector::ConfigSelector`] and shared read-only by every request.

pub mod inline;
pub mod topic;

use relay_core::{ReplyPayload, RequestContext, WriterMode};

pub use inline::{InlineReply, ReplyEvent};
pub use topic::TopicPublish;

use crate::error::StageError;

/// Result of a successful write.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// The reply must be returned in the HTTP response.
    Inline(ReplyEvent),
    /// The reply was published; the HTTP response carries no event.
    Published { message_ids: Vec<String> },
}

/// Reply delivery strategy.
#[derive(Debug, Clone)]
pub enum EventWriter {
    Inline(InlineReply),
    Topic(TopicPublish),
}

impl EventWriter {
    /// Mode this writer implements.
    #[must_use]
    pub fn mode(&self) -> WriterMode {
        match self {
            Self::Inline(_) => WriterMode::Inline,
            Self::Topic(_) => WriterMode::Topic,
        }
    }

    /// Encodes and delivers `reply`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Encode`] or [`StageError::Publish`]; see the
    /// individual strategies.
    pub async fn write(
        &self,
        reply: &ReplyPayload,
        ctx: &RequestContext,
    ) -> Result<Delivery, StageError> {
        match self {
            Self::Inline(writer) => writer.write(reply, ctx),
            Self::Topic(writer) => writer.write(reply, ctx).await,
        }
    }
}
