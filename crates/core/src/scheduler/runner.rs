use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::types::Tally;
use super::{KindReport, PassReport, SchedulerConfig, SchedulerError};
use crate::batch::{
    filter_within_interval, group_into_batches, BatchPath, Interval, INGESTION_INFIX,
};
use crate::enqueuer::{EnqueueError, Publisher, QueueBackend, TaskEnqueuer};
use crate::limiter::Limiter;
use crate::metrics;
use crate::storage::{Bucket, ObjectStore, StorageBackend};
use crate::task::{AggregationBatch, AggregationTask, IntakeBatchTask, Task};

/// Runs scheduling passes over the three buckets.
///
/// A pass lists the buckets, reconstructs complete batches inside the pass
/// windows, drops those whose task marker already exists, and publishes one
/// task per remaining batch (intake) or aggregation ID (aggregation). A
/// marker is written to the own-validation bucket once its task is
/// acknowledged. The pass returns only after every publish has resolved.
pub struct Scheduler<S: ObjectStore = StorageBackend, P: Publisher = QueueBackend> {
    config: SchedulerConfig,
    ingestion: Bucket<S>,
    own_validation: Bucket<S>,
    peer_validation: Bucket<S>,
    intake: TaskEnqueuer<P>,
    aggregate: TaskEnqueuer<P>,
    limiter: Limiter,
}

impl<S: ObjectStore, P: Publisher> Scheduler<S, P> {
    pub fn new(
        config: SchedulerConfig,
        ingestion: Bucket<S>,
        own_validation: Bucket<S>,
        peer_validation: Bucket<S>,
        intake: TaskEnqueuer<P>,
        aggregate: TaskEnqueuer<P>,
    ) -> Self {
        let limiter = Limiter::new(config.max_enqueue_workers);
        Self {
            config,
            ingestion,
            own_validation,
            peer_validation,
            intake,
            aggregate,
            limiter,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn intake_enqueuer(&self) -> &TaskEnqueuer<P> {
        &self.intake
    }

    pub fn aggregate_enqueuer(&self) -> &TaskEnqueuer<P> {
        &self.aggregate
    }

    /// Run one pass as of `now`.
    ///
    /// Per-task failures are logged and counted in the report. A listing
    /// failure skips the half of the pass that needed the bucket and makes
    /// the pass return [`SchedulerError::Incomplete`]. Marker listing and
    /// batch key parse failures stop the pass; nothing further is dispatched,
    /// though publishes already issued are still drained.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport, SchedulerError> {
        let started = Instant::now();
        let (intake_window, aggregation_window) = match self.windows(now) {
            Ok(windows) => windows,
            Err(fatal) => {
                metrics::LAST_FAILURE.set(now.timestamp());
                error!(error = %fatal, "Scheduling pass aborted");
                return Err(fatal);
            }
        };
        info!(
            %intake_window,
            %aggregation_window,
            is_first = self.config.is_first,
            "Starting scheduling pass"
        );

        let intake_tally = Arc::new(Tally::default());
        let aggregation_tally = Arc::new(Tally::default());

        let result = self
            .schedule(
                &intake_window,
                &aggregation_window,
                &intake_tally,
                &aggregation_tally,
            )
            .await;

        self.drain().await;

        let report = PassReport {
            intake_window,
            aggregation_window,
            intake: intake_tally.snapshot(),
            aggregation: aggregation_tally.snapshot(),
        };
        metrics::PASS_DURATION.observe(started.elapsed().as_secs_f64());

        let errors = match result {
            Ok(errors) => errors,
            Err(fatal) => {
                metrics::LAST_FAILURE.set(now.timestamp());
                error!(error = %fatal, "Scheduling pass aborted");
                return Err(fatal);
            }
        };

        log_report("intake", &report.intake);
        log_report("aggregation", &report.aggregation);

        if errors.is_empty() {
            metrics::LAST_SUCCESS.set(now.timestamp());
            Ok(report)
        } else {
            metrics::LAST_FAILURE.set(now.timestamp());
            Err(SchedulerError::Incomplete { report, errors })
        }
    }

    /// The intake and aggregation windows as of `now`.
    fn windows(&self, now: DateTime<Utc>) -> Result<(Interval, Interval), SchedulerError> {
        let out_of_range = |window| SchedulerError::WindowOutOfRange { window, now };
        let intake = Interval::intake_window(now, self.config.intake_max_age)
            .ok_or_else(|| out_of_range("intake"))?;
        let aggregation = Interval::aggregation_window(
            now,
            self.config.aggregation_period,
            self.config.grace_period,
        )
        .ok_or_else(|| out_of_range("aggregation"))?;
        Ok((intake, aggregation))
    }

    /// Both halves of the pass. Returns the non-fatal errors, or the first
    /// fatal one.
    async fn schedule(
        &self,
        intake_window: &Interval,
        aggregation_window: &Interval,
        intake_tally: &Arc<Tally>,
        aggregation_tally: &Arc<Tally>,
    ) -> Result<Vec<SchedulerError>, SchedulerError> {
        let markers = self
            .own_validation
            .list_task_markers()
            .await
            .map_err(|source| SchedulerError::MarkerListing {
                bucket: self.own_validation.name().to_string(),
                source,
            })?;
        debug!(count = markers.len(), "Loaded existing task markers");

        let mut errors = Vec::new();
        let intake = self
            .schedule_intake(intake_window, &markers, intake_tally)
            .await;
        collect(intake, &mut errors)?;
        let aggregation = self
            .schedule_aggregation(aggregation_window, &markers, aggregation_tally)
            .await;
        collect(aggregation, &mut errors)?;
        Ok(errors)
    }

    async fn schedule_intake(
        &self,
        window: &Interval,
        markers: &HashSet<String>,
        tally: &Arc<Tally>,
    ) -> Result<(), SchedulerError> {
        let batches = list_batches(&self.ingestion, INGESTION_INFIX).await?;

        let mut tasks = Vec::new();
        for batch in batches.iter().filter(|b| window.includes(b.time)) {
            Tally::bump(&tally.ready);
            let task = IntakeBatchTask::from(batch);
            if markers.contains(&task.marker()) {
                Tally::bump(&tally.already_scheduled);
                metrics::TASKS_ALREADY_SCHEDULED
                    .with_label_values(&["intake"])
                    .inc();
                continue;
            }
            tasks.push(Task::from(task));
        }

        info!(
            ready = tally.snapshot().ready,
            to_schedule = tasks.len(),
            "Scheduling intake tasks"
        );
        self.dispatch_all(&self.intake, tasks, tally).await;
        Ok(())
    }

    async fn schedule_aggregation(
        &self,
        window: &Interval,
        markers: &HashSet<String>,
        tally: &Arc<Tally>,
    ) -> Result<(), SchedulerError> {
        let own = list_batches(&self.own_validation, &self.config.own_validity_infix()).await?;
        let peer = list_batches(&self.peer_validation, &self.config.peer_validity_infix()).await?;

        let peer_paths: HashSet<String> =
            filter_within_interval(&peer, window).into_iter().collect();

        let mut by_aggregation: BTreeMap<&str, Vec<AggregationBatch>> = BTreeMap::new();
        for batch in own.iter().filter(|b| window.includes(b.time)) {
            if peer_paths.contains(&batch.path()) {
                by_aggregation
                    .entry(batch.aggregation_id.as_str())
                    .or_default()
                    .push(AggregationBatch::from(batch));
            } else {
                debug!(batch = %batch, "Own validation has no peer validation yet");
            }
        }

        let mut tasks = Vec::new();
        for (aggregation_id, batches) in by_aggregation {
            Tally::bump(&tally.ready);
            let task = AggregationTask::new(aggregation_id, window, batches);
            if markers.contains(&task.marker()) {
                Tally::bump(&tally.already_scheduled);
                metrics::TASKS_ALREADY_SCHEDULED
                    .with_label_values(&["aggregate"])
                    .inc();
                continue;
            }
            tasks.push(Task::from(task));
        }

        info!(
            ready = tally.snapshot().ready,
            to_schedule = tasks.len(),
            "Scheduling aggregation tasks"
        );
        self.dispatch_all(&self.aggregate, tasks, tally).await;
        Ok(())
    }

    /// Issue every task, each gated by the limiter.
    async fn dispatch_all(&self, enqueuer: &TaskEnqueuer<P>, tasks: Vec<Task>, tally: &Arc<Tally>) {
        join_all(
            tasks
                .iter()
                .map(|task| self.dispatch(enqueuer, task, Arc::clone(tally))),
        )
        .await;
    }

    async fn dispatch(&self, enqueuer: &TaskEnqueuer<P>, task: &Task, tally: Arc<Tally>) {
        let bucket = self.own_validation.clone();
        let kind = task.kind();
        let marker = task.marker();
        let trace_id = task.trace_id();
        let aggregation_id = task.aggregation_id().to_string();

        self.limiter
            .execute(|ticket| {
                let completion = move |result: Result<(), EnqueueError>| async move {
                    match result {
                        Ok(()) => {
                            Tally::bump(&tally.scheduled);
                            metrics::TASKS_SCHEDULED
                                .with_label_values(&[kind.as_str()])
                                .inc();
                            if let Err(e) = bucket.write_task_marker(&marker).await {
                                Tally::bump(&tally.marker_failures);
                                metrics::MARKER_WRITE_FAILURES
                                    .with_label_values(&[kind.as_str()])
                                    .inc();
                                warn!(
                                    marker = %marker,
                                    error = %e,
                                    "Task published but marker write failed; it will be scheduled again"
                                );
                            }
                        }
                        Err(e) => {
                            Tally::bump(&tally.enqueue_failures);
                            metrics::ENQUEUE_FAILURES
                                .with_label_values(&[kind.as_str(), e.kind()])
                                .inc();
                            error!(
                                trace_id = %trace_id,
                                aggregation_id = %aggregation_id,
                                marker = %marker,
                                error = %e,
                                "Failed to enqueue task"
                            );
                        }
                    }
                    ticket.done();
                };
                enqueuer.enqueue(task, completion)
            })
            .await;
    }

    /// Wait for outstanding publishes and their marker writes.
    async fn drain(&self) {
        self.intake.stop().await;
        self.aggregate.stop().await;
        self.limiter.drain().await;
    }
}

/// List a bucket and group its keys into the complete batches of `infix`.
async fn list_batches<S: ObjectStore>(
    bucket: &Bucket<S>,
    infix: &str,
) -> Result<Vec<BatchPath>, SchedulerError> {
    let keys = bucket
        .list_files()
        .await
        .map_err(|source| SchedulerError::Listing {
            bucket: bucket.name().to_string(),
            source,
        })?;
    let batches =
        group_into_batches(&keys, infix).map_err(|source| SchedulerError::MalformedBatch {
            bucket: bucket.name().to_string(),
            source,
        })?;
    debug!(bucket = %bucket.name(), infix, complete = batches.len(), "Grouped batches");
    Ok(batches)
}

/// Keep a half's error for the report unless it aborts the pass.
fn collect(
    result: Result<(), SchedulerError>,
    errors: &mut Vec<SchedulerError>,
) -> Result<(), SchedulerError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.aborts_pass() => Err(e),
        Err(e) => {
            error!(error = %e, "Part of the scheduling pass failed");
            errors.push(e);
            Ok(())
        }
    }
}

fn log_report(kind: &str, report: &KindReport) {
    info!(
        kind,
        ready = report.ready,
        already_scheduled = report.already_scheduled,
        scheduled = report.scheduled,
        enqueue_failures = report.enqueue_failures,
        marker_failures = report.marker_failures,
        "Scheduling summary"
    );
}
