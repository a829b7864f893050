//! Batch discovery over flat object listings.
//!
//! Ingestion and validation data land in object storage as three sibling
//! objects per batch: a header, an Avro payload and a signature. This module
//! turns a flat key listing back into logical batches and decides which of
//! them are complete enough to schedule.
//!
//! # Key layout
//!
//! ```text
//! {aggregation_id}/{YYYY}/{MM}/{DD}/{HH}/{mm}/{batch_id}.{infix}
//! {aggregation_id}/{YYYY}/{MM}/{DD}/{HH}/{mm}/{batch_id}.{infix}.avro
//! {aggregation_id}/{YYYY}/{MM}/{DD}/{HH}/{mm}/{batch_id}.{infix}.sig
//! ```
//!
//! where `infix` is one of [`INGESTION_INFIX`] or a validity infix built by
//! [`validity_infix`]. Keys under [`TASK_MARKER_PREFIX`] are never batches.

mod error;
mod interval;
mod path;

pub use error::BatchPathError;
pub use interval::Interval;
pub use path::{filter_within_interval, group_into_batches, BatchPath};

/// Prefix reserved for task markers; excluded from batch grouping.
pub const TASK_MARKER_PREFIX: &str = "task-markers/";

/// Infix used by ingestion batches.
pub const INGESTION_INFIX: &str = "batch";

/// Infix used by the validation batches written by server `index` (0 or 1).
pub fn validity_infix(index: u8) -> String {
    format!("validity_{}", index)
}
