//! Topic publish: the stage's reply is published to each configured topic in order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relay_core::{ReplyPayload, RequestContext};
use tracing::{info, warn};

use super::Delivery;
use crate::error::{PublishError, StageError};
use crate::publish::{PublishChannel, Publisher, CHANNEL_DRAIN_GRACE};

/// Publishes replies to an ordered list of topics.
#[derive(Clone)]
pub struct TopicPublish {
    project_id: String,
    topics: Vec<String>,
    publisher: Arc<dyn Publisher>,
    drain_grace: Duration,
}

impl std::fmt::Debug for TopicPublish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPublish")
            .field("project_id", &self.project_id)
            .field("topics", &self.topics)
            .field("drain_grace", &self.drain_grace)
            .finish_non_exhaustive()
    }
}

impl TopicPublish {
    #[must_use]
    pub fn new(project_id: String, topics: Vec<String>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            project_id,
            topics,
            publisher,
            drain_grace: CHANNEL_DRAIN_GRACE,
        }
    }

    /// Topics in publish order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Publishes `reply` to every topic in order.
    ///
    /// The first failing topic stops the loop; topics already published to stay
    /// published. Every channel opened during this call is released afterwards,
    /// each with a bounded drain window.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Encode`] if the reply cannot be serialized and
    /// [`StageError::Publish`] for the first topic that could not be reached.
    pub async fn write(
        &self,
        reply: &ReplyPayload,
        ctx: &RequestContext,
    ) -> Result<Delivery, StageError> {
        let data = Bytes::from(reply.to_json_bytes()?);

        let mut opened: Vec<Arc<dyn PublishChannel>> = Vec::with_capacity(self.topics.len());
        let mut message_ids = Vec::with_capacity(self.topics.len());
        let mut failure: Option<PublishError> = None;

        for topic in &self.topics {
            info!(
                request_id = %ctx.request_id,
                topic = %topic,
                bytes = data.len(),
                "publishing reply"
            );
            let result = match self.publisher.channel(&self.project_id, topic).await {
                Ok(channel) => {
                    opened.push(Arc::clone(&channel));
                    channel.publish(data.clone()).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(message_id) => {
                    metrics::counter!("relay_publish_total", "topic" => topic.clone(), "outcome" => "ok")
                        .increment(1);
                    message_ids.push(message_id);
                }
                Err(e) => {
                    metrics::counter!("relay_publish_total", "topic" => topic.clone(), "outcome" => "error")
                        .increment(1);
                    failure = Some(e);
                    break;
                }
            }
        }

        self.release(opened, ctx).await;

        match failure {
            Some(e) => {
                warn!(
                    request_id = %ctx.request_id,
                    topic = %e.topic(),
                    delivered = message_ids.len(),
                    "publish aborted: {e}"
                );
                Err(StageError::Publish(e))
            }
            None => Ok(Delivery::Published { message_ids }),
        }
    }

    /// Releases the channels opened by one write. Release failures are logged only:
    /// every message they carried has already been acknowledged.
    async fn release(&self, channels: Vec<Arc<dyn PublishChannel>>, ctx: &RequestContext) {
        for channel in channels {
            if let Err(e) = channel.shutdown(self.drain_grace).await {
                warn!(
                    request_id = %ctx.request_id,
                    topic = %channel.topic(),
                    "publish channel release failed: {e}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::publish::InMemoryPublisher;

    fn reply() -> ReplyPayload {
        ReplyPayload::new(json!({"bucket": "b", "name": "n"}))
    }

    fn writer(publisher: &InMemoryPublisher, topics: &[&str]) -> TopicPublish {
        TopicPublish::new(
            "proj".to_string(),
            topics.iter().map(|t| (*t).to_string()).collect(),
            Arc::new(publisher.clone()),
        )
    }

    #[tokio::test]
    async fn publishes_to_topics_in_order() {
        let publisher = InMemoryPublisher::new();
        let delivery = writer(&publisher, &["t1", "t2"])
            .write(&reply(), &RequestContext::new("r"))
            .await
            .unwrap();

        let Delivery::Published { message_ids } = delivery else {
            panic!("expected published delivery");
        };
        assert_eq!(message_ids.len(), 2);

        let log = publisher.published();
        let topics: Vec<_> = log.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["t1", "t2"]);
        assert!(log.iter().all(|m| m.project_id == "proj"));
        assert_eq!(log[0].data, Bytes::from(reply().to_json_bytes().unwrap()));
    }

    #[tokio::test]
    async fn second_topic_failure_keeps_first_and_reports_error() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_topic("t2");

        let err = writer(&publisher, &["t1", "t2", "t3"])
            .write(&reply(), &RequestContext::new("r"))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Publish(ref e) if e.topic() == "t2"));
        let log = publisher.published();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].topic, "t1");
        // t3 is never attempted.
        assert_eq!(publisher.channels_opened(), 2);
    }

    #[tokio::test]
    async fn every_opened_channel_is_released() {
        let publisher = InMemoryPublisher::new();
        writer(&publisher, &["a", "b", "c"])
            .write(&reply(), &RequestContext::new("r"))
            .await
            .unwrap();
        assert_eq!(publisher.channels_opened(), 3);
        assert_eq!(publisher.channels_released(), 3);

        let failing = InMemoryPublisher::new();
        failing.fail_topic("b");
        let _ = writer(&failing, &["a", "b", "c"])
            .write(&reply(), &RequestContext::new("r"))
            .await;
        assert_eq!(failing.channels_opened(), 2);
        assert_eq!(failing.channels_released(), 2);
    }

    struct UnreachablePublisher;

    #[async_trait]
    impl Publisher for UnreachablePublisher {
        async fn channel(
            &self,
            _project_id: &str,
            topic_id: &str,
        ) -> Result<Arc<dyn PublishChannel>, PublishError> {
            Err(PublishError::Connect {
                topic: topic_id.to_string(),
                detail: "no route".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn channel_open_failure_aborts() {
        let writer = TopicPublish::new(
            "proj".to_string(),
            vec!["t1".to_string()],
            Arc::new(UnreachablePublisher),
        );
        let err = writer
            .write(&reply(), &RequestContext::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Publish(PublishError::Connect { .. })));
    }
}
