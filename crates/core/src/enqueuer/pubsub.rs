//! Google Cloud Pub/Sub publisher over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::retry::{with_retry_if, RetryConfig};
use super::{Delivery, EnqueueError, Publisher};
use crate::cloud::GcpTokenSource;

/// Public Pub/Sub endpoint.
pub const PUBSUB_API_URL: &str = "https://pubsub.googleapis.com";

const BACKEND: &str = "Pub/Sub";

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    messages: [PubsubMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PubsubMessage<'a> {
    data: &'a str,
}

/// Publishes to one Pub/Sub topic, retrying transient failures.
#[derive(Debug, Clone)]
pub struct PubSubPublisher {
    client: Client,
    base_url: String,
    topic_path: String,
    tokens: GcpTokenSource,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl PubSubPublisher {
    pub fn new(
        client: Client,
        project: &str,
        topic: &str,
        tokens: GcpTokenSource,
    ) -> Result<Self, EnqueueError> {
        if project.is_empty() || topic.is_empty() || topic.contains('/') {
            return Err(EnqueueError::InvalidTopic {
                topic: format!("projects/{}/topics/{}", project, topic),
                reason: "expected a non-empty project and topic ID".to_string(),
            });
        }

        Ok(Self {
            client,
            base_url: PUBSUB_API_URL.to_string(),
            topic_path: format!("projects/{}/topics/{}", project, topic),
            tokens,
            retry: RetryConfig::default(),
            attempt_timeout: Duration::from_secs(60),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    async fn publish_once(&self, data: &str) -> Result<(), EnqueueError> {
        let token = self.tokens.token().await?;
        let url = format!("{}/v1/{}:publish", self.base_url, self.topic_path);
        let request = PublishRequest {
            messages: [PubsubMessage { data }],
        };

        let send = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send();
        let response = tokio::time::timeout(self.attempt_timeout, send)
            .await
            .map_err(|_| EnqueueError::Timeout { backend: BACKEND })?
            .map_err(|e| EnqueueError::from_reqwest(BACKEND, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnqueueError::Publish {
                backend: BACKEND,
                status: Some(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        debug!(topic = %self.topic_path, "Published message");
        Ok(())
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    fn name(&self) -> &str {
        &self.topic_path
    }

    fn delivery(&self) -> Delivery {
        Delivery::Detached
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), EnqueueError> {
        let data = STANDARD.encode(&payload);
        with_retry_if(
            &self.retry,
            || self.publish_once(&data),
            EnqueueError::is_retryable,
        )
        .await
    }
}
