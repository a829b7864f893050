//! Mock publisher for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::enqueuer::{Delivery, EnqueueError, Publisher};

/// A failure rule: payloads containing `pattern` (or all payloads when it
/// is `None`) fail with `message`.
#[derive(Debug, Clone)]
struct FailureRule {
    pattern: Option<String>,
    message: String,
}

/// Mock implementation of the [`Publisher`] trait.
///
/// Provides controllable behavior for testing:
/// - Detached or inline delivery
/// - Recorded payloads for assertions
/// - Failures for all payloads or those containing a pattern
/// - Simulated latency, with peak concurrency tracking
#[derive(Debug, Clone)]
pub struct MockPublisher {
    name: String,
    delivery: Delivery,
    latency: Option<Duration>,
    published: Arc<RwLock<Vec<Vec<u8>>>>,
    failures: Arc<RwLock<Vec<FailureRule>>>,
    attempts: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockPublisher {
    fn with_delivery(delivery: Delivery) -> Self {
        Self {
            name: "mock-topic".to_string(),
            delivery,
            latency: None,
            published: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A publisher that behaves like Pub/Sub.
    pub fn detached() -> Self {
        Self::with_delivery(Delivery::Detached)
    }

    /// A publisher that behaves like SNS.
    pub fn inline() -> Self {
        Self::with_delivery(Delivery::Inline)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hold every publish for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every subsequent publish.
    pub async fn fail_all(&self, message: impl Into<String>) {
        self.failures.write().await.push(FailureRule {
            pattern: None,
            message: message.into(),
        });
    }

    /// Fail publishes whose payload contains `pattern`.
    pub async fn fail_when_contains(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.failures.write().await.push(FailureRule {
            pattern: Some(pattern.into()),
            message: message.into(),
        });
    }

    /// Successfully published payloads.
    pub async fn published(&self) -> Vec<Vec<u8>> {
        self.published.read().await.clone()
    }

    /// Successfully published payloads, parsed as JSON.
    pub async fn published_json(&self) -> Vec<serde_json::Value> {
        self.published
            .read()
            .await
            .iter()
            .filter_map(|payload| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// Publish calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of publishes in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn failure_for(&self, payload: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(payload);
        self.failures
            .read()
            .await
            .iter()
            .find(|rule| match &rule.pattern {
                Some(pattern) => text.contains(pattern.as_str()),
                None => true,
            })
            .map(|rule| rule.message.clone())
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn delivery(&self) -> Delivery {
        self.delivery
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), EnqueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.failure_for(&payload).await {
            Some(message) => Err(EnqueueError::Publish {
                backend: "mock",
                status: Some(500),
                message,
            }),
            None => {
                self.published.write().await.push(payload);
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
