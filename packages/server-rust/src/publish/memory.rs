//! In-memory [`Publisher`] that records every message.
//!
//! Used by tests and by local runs without a message broker. Individual topics can
//! be marked as failing to exercise partial-delivery paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::{PublishChannel, Publisher};
use crate::drain::DrainTracker;
use crate::error::PublishError;

/// A message accepted by the in-memory publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub project_id: String,
    pub topic: String,
    pub message_id: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<Vec<PublishedMessage>>,
    failing_topics: RwLock<HashSet<String>>,
    next_id: AtomicU64,
    opened: AtomicU64,
    released: AtomicU64,
}

/// Records published messages in order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    shared: Arc<Shared>,
}

impl InMemoryPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish to `topic` fail.
    pub fn fail_topic(&self, topic: &str) {
        self.shared.failing_topics.write().insert(topic.to_string());
    }

    /// Messages accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.shared.log.lock().clone()
    }

    /// Number of channels opened.
    #[must_use]
    pub fn channels_opened(&self) -> u64 {
        self.shared.opened.load(Ordering::Acquire)
    }

    /// Number of channels released via `shutdown`.
    #[must_use]
    pub fn channels_released(&self) -> u64 {
        self.shared.released.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn channel(
        &self,
        project_id: &str,
        topic_id: &str,
    ) -> Result<Arc<dyn PublishChannel>, PublishError> {
        self.shared.opened.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(InMemoryChannel {
            shared: Arc::clone(&self.shared),
            project_id: project_id.to_string(),
            topic: topic_id.to_string(),
            tracker: DrainTracker::new(),
        }))
    }
}

struct InMemoryChannel {
    shared: Arc<Shared>,
    project_id: String,
    topic: String,
    tracker: DrainTracker,
}

#[async_trait]
impl PublishChannel for InMemoryChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, data: Bytes) -> Result<String, PublishError> {
        let _guard = self.tracker.guard();
        if self.shared.failing_topics.read().contains(&self.topic) {
            return Err(PublishError::Rejected {
                topic: self.topic.clone(),
                status: 503,
                detail: "topic marked as failing".to_string(),
            });
        }

        let message_id = self.shared.next_id.fetch_add(1, Ordering::AcqRel).to_string();
        self.shared.log.lock().push(PublishedMessage {
            project_id: self.project_id.clone(),
            topic: self.topic.clone(),
            message_id: message_id.clone(),
            data,
        });
        Ok(message_id)
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), PublishError> {
        let drained = self.tracker.wait_idle(grace).await;
        self.shared.released.fetch_add(1, Ordering::AcqRel);
        if drained {
            Ok(())
        } else {
            Err(PublishError::DrainTimeout {
                topic: self.topic.clone(),
                grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_messages_in_order() {
        let publisher = InMemoryPublisher::new();
        let a = publisher.channel("p", "a").await.unwrap();
        let b = publisher.channel("p", "b").await.unwrap();

        a.publish(Bytes::from_static(b"1")).await.unwrap();
        b.publish(Bytes::from_static(b"2")).await.unwrap();

        let log = publisher.published();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].topic, "a");
        assert_eq!(log[1].topic, "b");
        assert_eq!(log[1].data, Bytes::from_static(b"2"));
        assert_ne!(log[0].message_id, log[1].message_id);
    }

    #[tokio::test]
    async fn failing_topic_rejects() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_topic("bad");
        let channel = publisher.channel("p", "bad").await.unwrap();

        let err = channel.publish(Bytes::new()).await.unwrap_err();
        assert_eq!(err.topic(), "bad");
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn shutdown_counts_releases() {
        let publisher = InMemoryPublisher::new();
        let channel = publisher.channel("p", "a").await.unwrap();
        channel.shutdown(Duration::from_millis(10)).await.unwrap();
        assert_eq!(publisher.channels_opened(), 1);
        assert_eq!(publisher.channels_released(), 1);
    }
}
