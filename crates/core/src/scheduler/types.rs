use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::batch::{BatchPathError, Interval};
use crate::storage::StorageError;

/// Errors that end a scheduling pass, or one half of it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A bucket could not be listed. Only the half that needs it is skipped.
    #[error("Failed to list {bucket}: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// The existing task markers could not be listed. Nothing is scheduled.
    #[error("Failed to list task markers in {bucket}: {source}")]
    MarkerListing {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// A key in a batch family did not parse. Nothing further is scheduled.
    #[error("Malformed batch key in {bucket}: {source}")]
    MalformedBatch {
        bucket: String,
        #[source]
        source: BatchPathError,
    },

    /// A pass window falls outside the representable time range. Nothing is
    /// scheduled.
    #[error("The {window} window as of {now} is out of range")]
    WindowOutOfRange {
        window: &'static str,
        now: DateTime<Utc>,
    },

    /// The pass ran to completion but part of it failed.
    #[error("Scheduling pass incomplete: {}", describe(.errors))]
    Incomplete {
        report: PassReport,
        errors: Vec<SchedulerError>,
    },
}

fn describe(errors: &[SchedulerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchedulerError {
    /// Whether the error stops the pass before anything else is dispatched.
    pub fn aborts_pass(&self) -> bool {
        matches!(
            self,
            Self::MarkerListing { .. }
                | Self::MalformedBatch { .. }
                | Self::WindowOutOfRange { .. }
        )
    }
}

/// Outcome counts for one kind of task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindReport {
    /// Complete batches (intake) or aggregation IDs (aggregation) in the window.
    pub ready: usize,
    /// Skipped because their marker already exists.
    pub already_scheduled: usize,
    /// Published successfully.
    pub scheduled: usize,
    pub enqueue_failures: usize,
    /// Published, but the marker write failed.
    pub marker_failures: usize,
}

/// What a scheduling pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub intake_window: Interval,
    pub aggregation_window: Interval,
    pub intake: KindReport,
    pub aggregation: KindReport,
}

/// Counters shared with enqueue completions.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub ready: AtomicUsize,
    pub already_scheduled: AtomicUsize,
    pub scheduled: AtomicUsize,
    pub enqueue_failures: AtomicUsize,
    pub marker_failures: AtomicUsize,
}

impl Tally {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> KindReport {
        KindReport {
            ready: self.ready.load(Ordering::SeqCst),
            already_scheduled: self.already_scheduled.load(Ordering::SeqCst),
            scheduled: self.scheduled.load(Ordering::SeqCst),
            enqueue_failures: self.enqueue_failures.load(Ordering::SeqCst),
            marker_failures: self.marker_failures.load(Ordering::SeqCst),
        }
    }
}
