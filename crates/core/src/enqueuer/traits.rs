//! Trait definitions for the enqueuer module.

use async_trait::async_trait;

use super::EnqueueError;

/// How a publisher's calls relate to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Publish runs in the background; `enqueue` returns before the ack.
    Detached,
    /// Publish is awaited inside `enqueue`.
    Inline,
}

/// A message queue topic that accepts serialized tasks.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Topic name, used in logs.
    fn name(&self) -> &str;

    fn delivery(&self) -> Delivery;

    /// Publish one message, retrying internally if the backend does.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), EnqueueError>;
}
