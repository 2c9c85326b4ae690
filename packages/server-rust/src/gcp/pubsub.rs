//! Pub/Sub publisher over the REST `topics.publish` method.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{encode_path_segment, GcpClient};
use crate::drain::DrainTracker;
use crate::error::PublishError;
use crate::publish::{PublishChannel, Publisher};

/// Production endpoint.
pub const PUBSUB_URL: &str = "https://pubsub.googleapis.com";

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [OutboundMessage<'a>; 1],
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Opens REST publish channels.
#[derive(Clone)]
pub struct PubSubPublisher {
    client: GcpClient,
}

impl PubSubPublisher {
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn channel(
        &self,
        project_id: &str,
        topic_id: &str,
    ) -> Result<Arc<dyn PublishChannel>, PublishError> {
        if project_id.is_empty() || topic_id.is_empty() {
            return Err(PublishError::Connect {
                topic: topic_id.to_string(),
                detail: "project and topic must be non-empty".to_string(),
            });
        }
        Ok(Arc::new(PubSubChannel {
            client: self.client.clone(),
            topic: topic_id.to_string(),
            path: format!(
                "/v1/projects/{}/topics/{}:publish",
                encode_path_segment(project_id),
                encode_path_segment(topic_id)
            ),
            tracker: DrainTracker::new(),
            released: AtomicBool::new(false),
        }))
    }
}

struct PubSubChannel {
    client: GcpClient,
    topic: String,
    path: String,
    tracker: DrainTracker,
    released: AtomicBool,
}

impl PubSubChannel {
    fn transport(&self, detail: impl std::fmt::Display) -> PublishError {
        PublishError::Transport {
            topic: self.topic.clone(),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl PublishChannel for PubSubChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, data: Bytes) -> Result<String, PublishError> {
        if self.released.load(Ordering::Acquire) {
            return Err(self.transport("channel already released"));
        }
        let _guard = self.tracker.guard();

        let encoded = BASE64.encode(&data);
        let body = PublishRequest {
            messages: [OutboundMessage { data: &encoded }],
        };
        let request = self
            .client
            .request(Method::POST, &self.path)
            .await
            .map_err(|e| PublishError::Connect {
                topic: self.topic.clone(),
                detail: format!("{e:#}"),
            })?;
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                topic: self.topic.clone(),
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: PublishResponse = response.json().await.map_err(|e| self.transport(e))?;
        let message_id = parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| self.transport("response carried no message id"))?;
        debug!(topic = %self.topic, message_id, "message published");
        Ok(message_id)
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), PublishError> {
        self.released.store(true, Ordering::Release);
        if self.tracker.wait_idle(grace).await {
            Ok(())
        } else {
            Err(PublishError::DrainTimeout {
                topic: self.topic.clone(),
                grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
