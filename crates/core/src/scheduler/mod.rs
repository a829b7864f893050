//! The scheduling driver: discovers ready batches and enqueues their tasks.

mod config;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use runner::Scheduler;
pub use types::{KindReport, PassReport, SchedulerError};
