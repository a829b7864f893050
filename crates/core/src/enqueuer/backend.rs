use async_trait::async_trait;

use super::{Delivery, EnqueueError, PubSubPublisher, Publisher, SnsPublisher};

/// The queue backends a task topic can be published to.
#[derive(Debug, Clone)]
pub enum QueueBackend {
    PubSub(PubSubPublisher),
    Sns(SnsPublisher),
}

#[async_trait]
impl Publisher for QueueBackend {
    fn name(&self) -> &str {
        match self {
            Self::PubSub(p) => p.name(),
            Self::Sns(p) => p.name(),
        }
    }

    fn delivery(&self) -> Delivery {
        match self {
            Self::PubSub(p) => p.delivery(),
            Self::Sns(p) => p.delivery(),
        }
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), EnqueueError> {
        match self {
            Self::PubSub(p) => p.publish(payload).await,
            Self::Sns(p) => p.publish(payload).await,
        }
    }
}

impl From<PubSubPublisher> for QueueBackend {
    fn from(publisher: PubSubPublisher) -> Self {
        Self::PubSub(publisher)
    }
}

impl From<SnsPublisher> for QueueBackend {
    fn from(publisher: SnsPublisher) -> Self {
        Self::Sns(publisher)
    }
}
