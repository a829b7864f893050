//! Task publication to a message queue.
//!
//! A [`TaskEnqueuer`] serializes tasks and hands them to a [`Publisher`].
//! Pub/Sub publishes are detached from the caller and retried with backoff;
//! SNS publishes are awaited inline. Callers bound concurrency themselves with
//! the [`Limiter`](crate::limiter::Limiter).

mod backend;
mod error;
pub mod pubsub;
pub mod retry;
pub mod sns;
mod task_enqueuer;
mod traits;

pub use backend::QueueBackend;
pub use error::EnqueueError;
pub use pubsub::PubSubPublisher;
pub use retry::RetryConfig;
pub use sns::SnsPublisher;
pub use task_enqueuer::TaskEnqueuer;
pub use traits::{Delivery, Publisher};
