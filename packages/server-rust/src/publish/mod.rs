//! Topic publishing seam used by the topic writer.
//!
//! A [`Publisher`] is shared process-wide and hands out [`PublishChannel`]s, one per
//! topic per write. Channels are owned by the write that opened them, so releasing
//! one never interferes with a concurrent request publishing to the same topic.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PublishError;

pub use memory::InMemoryPublisher;

/// Grace period a channel gets to finish outstanding publishes when released.
pub const CHANNEL_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Opens publish channels to named topics.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Opens a channel to `projects/{project_id}/topics/{topic_id}`.
    async fn channel(
        &self,
        project_id: &str,
        topic_id: &str,
    ) -> Result<Arc<dyn PublishChannel>, PublishError>;
}

/// A handle for publishing opaque messages to one topic.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    /// Topic id this channel publishes to.
    fn topic(&self) -> &str;

    /// Publishes one message and returns the server-assigned message id.
    async fn publish(&self, data: Bytes) -> Result<String, PublishError>;

    /// Releases the channel after waiting up to `grace` for in-flight publishes.
    async fn shutdown(&self, grace: Duration) -> Result<(), PublishError>;
}
