pub mod batch;
pub mod cloud;
pub mod config;
pub mod enqueuer;
pub mod limiter;
pub mod metrics;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod testing;

pub use batch::{group_into_batches, BatchPath, BatchPathError, Interval};
pub use cloud::{CloudContext, CredentialsError, Endpoints};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    TaskQueueKind,
};
pub use enqueuer::{
    EnqueueError, PubSubPublisher, Publisher, QueueBackend, SnsPublisher, TaskEnqueuer,
};
pub use limiter::{Limiter, Ticket};
pub use scheduler::{KindReport, PassReport, Scheduler, SchedulerConfig, SchedulerError};
pub use storage::{Bucket, ObjectStore, StorageBackend, StorageError};
pub use task::{AggregationBatch, AggregationTask, IntakeBatchTask, Task, TaskKind};
