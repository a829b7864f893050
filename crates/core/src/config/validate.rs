use super::{types::Config, BucketConfig, ConfigError, TaskQueueKind};
use crate::storage::BucketUrl;

/// Upper bound on every scheduler period or age, in seconds.
const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Validate configuration
/// Currently validates:
/// - Bucket URLs are well formed and identities match the backend
/// - Scheduler limits and periods are positive and at most a year
/// - The selected task queue has its section filled in
/// - The push gateway, if any, is an HTTP URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_bucket("buckets.ingestion", &config.buckets.ingestion)?;
    validate_bucket("buckets.own_validation", &config.buckets.own_validation)?;
    validate_bucket("buckets.peer_validation", &config.buckets.peer_validation)?;

    let scheduler = &config.scheduler;
    if scheduler.max_enqueue_workers == 0 {
        return Err(invalid("scheduler.max_enqueue_workers must be greater than 0"));
    }
    if scheduler.aggregation_period_secs == 0 {
        return Err(invalid("scheduler.aggregation_period_secs must be greater than 0"));
    }
    if scheduler.intake_max_age_secs == 0 {
        return Err(invalid("scheduler.intake_max_age_secs must be greater than 0"));
    }
    if scheduler.request_timeout_secs == 0 {
        return Err(invalid("scheduler.request_timeout_secs must be greater than 0"));
    }
    for (field, secs) in [
        ("scheduler.intake_max_age_secs", scheduler.intake_max_age_secs),
        ("scheduler.aggregation_period_secs", scheduler.aggregation_period_secs),
        ("scheduler.grace_period_secs", scheduler.grace_period_secs),
        ("scheduler.request_timeout_secs", scheduler.request_timeout_secs),
    ] {
        if secs > MAX_WINDOW_SECS {
            return Err(invalid(format!(
                "{} must be at most {} (one year), got {}",
                field, MAX_WINDOW_SECS, secs
            )));
        }
    }

    match config.task_queue.kind {
        TaskQueueKind::GcpPubsub => {
            let Some(pubsub) = &config.task_queue.gcp_pubsub else {
                return Err(invalid(
                    "task_queue.kind = \"gcp_pubsub\" requires a [task_queue.gcp_pubsub] section",
                ));
            };
            require("task_queue.gcp_pubsub.project", &pubsub.project)?;
            require("task_queue.gcp_pubsub.intake_topic", &pubsub.intake_topic)?;
            require("task_queue.gcp_pubsub.aggregate_topic", &pubsub.aggregate_topic)?;
        }
        TaskQueueKind::AwsSns => {
            let Some(sns) = &config.task_queue.aws_sns else {
                return Err(invalid(
                    "task_queue.kind = \"aws_sns\" requires a [task_queue.aws_sns] section",
                ));
            };
            require("task_queue.aws_sns.region", &sns.region)?;
            require("task_queue.aws_sns.intake_topic_arn", &sns.intake_topic_arn)?;
            require("task_queue.aws_sns.aggregate_topic_arn", &sns.aggregate_topic_arn)?;
        }
    }

    if let Some(gateway) = &config.metrics.push_gateway {
        if !gateway.starts_with("http://") && !gateway.starts_with("https://") {
            return Err(invalid(format!(
                "metrics.push_gateway must be an http(s) URL, got {}",
                gateway
            )));
        }
    }

    Ok(())
}

fn validate_bucket(field: &str, bucket: &BucketConfig) -> Result<(), ConfigError> {
    let url = BucketUrl::parse(&bucket.url)
        .map_err(|e| invalid(format!("{}.url: {}", field, e)))?;
    url.check_identity(bucket.identity.as_deref())
        .map_err(|e| invalid(format!("{}.identity: {}", field, e)))
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
