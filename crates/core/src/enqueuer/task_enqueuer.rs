use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{Delivery, EnqueueError, Publisher, QueueBackend};
use crate::task::Task;

/// Publishes tasks to one topic and tracks outstanding completions.
///
/// `enqueue` never blocks on a round-trip for detached publishers; the
/// publish and its completion run on a background task. Inline publishers are
/// awaited before `enqueue` returns. Either way every completion has run once
/// [`TaskEnqueuer::stop`] returns.
pub struct TaskEnqueuer<P: Publisher = QueueBackend> {
    publisher: Arc<P>,
    dry_run: bool,
    in_flight: Mutex<JoinSet<()>>,
}

impl<P: Publisher> TaskEnqueuer<P> {
    pub fn new(publisher: P, dry_run: bool) -> Self {
        Self {
            publisher: Arc::new(publisher),
            dry_run,
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn topic(&self) -> &str {
        self.publisher.name()
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Publish `task` and invoke `completion` exactly once with the outcome.
    ///
    /// Serialization failures are reported without a publish attempt. In
    /// dry-run mode the completion receives `Ok(())` and nothing is sent.
    pub async fn enqueue<F, Fut>(&self, task: &Task, completion: F)
    where
        F: FnOnce(Result<(), EnqueueError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.dry_run {
            info!(
                topic = %self.topic(),
                kind = task.kind().as_str(),
                marker = %task.marker(),
                "Dry run, not publishing task"
            );
            completion(Ok(())).await;
            return;
        }

        let payload = match task.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                completion(Err(EnqueueError::Marshal(e))).await;
                return;
            }
        };

        debug!(
            topic = %self.topic(),
            trace_id = %task.trace_id(),
            marker = %task.marker(),
            "Publishing task"
        );

        match self.publisher.delivery() {
            Delivery::Inline => {
                let result = self.publisher.publish(payload).await;
                completion(result).await;
            }
            Delivery::Detached => {
                let publisher = Arc::clone(&self.publisher);
                self.in_flight.lock().await.spawn(async move {
                    let result = publisher.publish(payload).await;
                    completion(result).await;
                });
            }
        }
    }

    /// Wait for every completion issued so far. The enqueuer stays usable.
    pub async fn stop(&self) {
        let mut in_flight = self.in_flight.lock().await;
        let outstanding = in_flight.len();
        if outstanding > 0 {
            debug!(topic = %self.topic(), outstanding, "Waiting for in-flight publishes");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(topic = %self.topic(), error = %e, "Publish task failed to complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::IntakeBatchTask;
    use crate::testing::MockPublisher;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn task(batch: &str) -> Task {
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        IntakeBatchTask::new("kittens-seen", batch, date).into()
    }

    #[tokio::test]
    async fn test_detached_enqueue_returns_before_publish() {
        let publisher = MockPublisher::detached().with_latency(Duration::from_millis(50));
        let enqueuer = TaskEnqueuer::new(publisher, false);
        let completed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&completed);
        enqueuer
            .enqueue(&task("b1"), move |result| async move {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        enqueuer.stop().await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(enqueuer.publisher().published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_inline_enqueue_completes_before_return() {
        let enqueuer = TaskEnqueuer::new(MockPublisher::inline(), false);
        let completed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&completed);
        enqueuer
            .enqueue(&task("b1"), move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        enqueuer.stop().await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_publishes() {
        let enqueuer = TaskEnqueuer::new(MockPublisher::detached(), true);
        let completed = Arc::new(AtomicUsize::new(0));

        for batch in ["b1", "b2", "b3"] {
            let counter = Arc::clone(&completed);
            enqueuer
                .enqueue(&task(batch), move |result| async move {
                    assert!(result.is_ok());
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        enqueuer.stop().await;

        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert!(enqueuer.publisher().published().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_reaches_completion() {
        let publisher = MockPublisher::detached();
        publisher.fail_all("topic deleted").await;
        let enqueuer = TaskEnqueuer::new(publisher, false);
        let failures = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&failures);
        enqueuer
            .enqueue(&task("b1"), move |result| async move {
                if result.is_err() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        enqueuer.stop().await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_reusable() {
        let enqueuer = TaskEnqueuer::new(MockPublisher::detached(), false);
        enqueuer.stop().await;

        enqueuer.enqueue(&task("b1"), |_| async {}).await;
        enqueuer.stop().await;
        enqueuer.enqueue(&task("b2"), |_| async {}).await;
        enqueuer.stop().await;

        assert_eq!(enqueuer.publisher().published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_payload_is_task_json() {
        let enqueuer = TaskEnqueuer::new(MockPublisher::inline(), false);
        let task = task("b1");
        enqueuer.enqueue(&task, |_| async {}).await;

        let published = enqueuer.publisher().published().await;
        let value: serde_json::Value = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(value["batch-id"], "b1");
        assert_eq!(value["aggregation-id"], "kittens-seen");
        assert_eq!(value["date"], "2020/01/01/00/00");
    }
}
