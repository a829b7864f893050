use serde::{Deserialize, Serialize};

use crate::cloud::Endpoints;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Whether this deployment is the first of the two aggregation servers.
    /// Decides which validity infix counts as our own.
    #[serde(default)]
    pub is_first: bool,
    /// Log what would be scheduled without publishing or writing markers.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub log_format: LogFormat,
    pub buckets: BucketsConfig,
    #[serde(default)]
    pub scheduler: ScheduleConfig,
    pub task_queue: TaskQueueConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// API endpoint overrides, for emulators.
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The three buckets a pass reads from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketsConfig {
    /// Where ingestion servers deliver batches.
    pub ingestion: BucketConfig,
    /// Where our validations are written. Task markers live here too.
    pub own_validation: BucketConfig,
    /// Where the peer server's validations are delivered.
    pub peer_validation: BucketConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketConfig {
    /// `gs://{bucket}` or `s3://{region}/{bucket}`
    pub url: String,
    /// AWS role ARN to assume for S3 buckets. Unset means ambient credentials.
    #[serde(default)]
    pub identity: Option<String>,
}

/// Scheduling windows and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Maximum publishes in flight at once.
    #[serde(default = "default_max_enqueue_workers")]
    pub max_enqueue_workers: usize,
    /// How far back to look for ingestion batches.
    #[serde(default = "default_intake_max_age_secs")]
    pub intake_max_age_secs: u64,
    #[serde(default = "default_aggregation_period_secs")]
    pub aggregation_period_secs: u64,
    /// How long to wait after a period ends before aggregating it.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Timeout for each cloud API request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_enqueue_workers: default_max_enqueue_workers(),
            intake_max_age_secs: default_intake_max_age_secs(),
            aggregation_period_secs: default_aggregation_period_secs(),
            grace_period_secs: default_grace_period_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_enqueue_workers() -> usize {
    100
}

fn default_intake_max_age_secs() -> u64 {
    60 * 60
}

fn default_aggregation_period_secs() -> u64 {
    3 * 60 * 60
}

fn default_grace_period_secs() -> u64 {
    60 * 60
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Task queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskQueueConfig {
    pub kind: TaskQueueKind,
    /// Required when kind = "gcp_pubsub"
    #[serde(default)]
    pub gcp_pubsub: Option<PubSubConfig>,
    /// Required when kind = "aws_sns"
    #[serde(default)]
    pub aws_sns: Option<SnsConfig>,
}

/// Available task queue backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskQueueKind {
    GcpPubsub,
    AwsSns,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubConfig {
    pub project: String,
    pub intake_topic: String,
    pub aggregate_topic: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnsConfig {
    pub region: String,
    pub intake_topic_arn: String,
    pub aggregate_topic_arn: String,
    /// AWS role ARN to assume for publishing. Unset means ambient credentials.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prometheus push gateway base URL, e.g. `http://pushgateway:9091`
    #[serde(default)]
    pub push_gateway: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[buckets.ingestion]
url = "gs://ingestion"

[buckets.own_validation]
url = "gs://own-validation"

[buckets.peer_validation]
url = "s3://us-west-1/peer-validation"
identity = "arn:aws:iam::123456789012:role/peer-reader"

[task_queue]
kind = "gcp_pubsub"

[task_queue.gcp_pubsub]
project = "prio-project"
intake_topic = "intake-tasks"
aggregate_topic = "aggregate-tasks"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert!(!config.is_first);
        assert!(!config.dry_run);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.buckets.ingestion.url, "gs://ingestion");
        assert!(config.buckets.ingestion.identity.is_none());
        assert_eq!(
            config.buckets.peer_validation.identity.as_deref(),
            Some("arn:aws:iam::123456789012:role/peer-reader")
        );
        assert_eq!(config.task_queue.kind, TaskQueueKind::GcpPubsub);
        assert!(config.task_queue.aws_sns.is_none());
        assert!(config.metrics.push_gateway.is_none());
        assert!(config.endpoints.gcs.is_none());
    }

    #[test]
    fn test_deserialize_scheduler_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.scheduler.max_enqueue_workers, 100);
        assert_eq!(config.scheduler.intake_max_age_secs, 3600);
        assert_eq!(config.scheduler.aggregation_period_secs, 10800);
        assert_eq!(config.scheduler.grace_period_secs, 3600);
        assert_eq!(config.scheduler.request_timeout_secs, 60);
    }

    #[test]
    fn test_deserialize_sns_queue() {
        let toml = r#"
is_first = true
log_format = "json"

[buckets.ingestion]
url = "s3://us-west-1/ingestion"

[buckets.own_validation]
url = "gs://own"

[buckets.peer_validation]
url = "gs://peer"

[scheduler]
max_enqueue_workers = 8
aggregation_period_secs = 28800

[task_queue]
kind = "aws_sns"

[task_queue.aws_sns]
region = "us-west-1"
intake_topic_arn = "arn:aws:sns:us-west-1:1:intake"
aggregate_topic_arn = "arn:aws:sns:us-west-1:1:aggregate"

[metrics]
push_gateway = "http://pushgateway:9091"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.is_first);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.scheduler.max_enqueue_workers, 8);
        assert_eq!(config.scheduler.aggregation_period_secs, 28800);
        assert_eq!(config.scheduler.grace_period_secs, 3600);
        assert_eq!(config.task_queue.kind, TaskQueueKind::AwsSns);
        let sns = config.task_queue.aws_sns.as_ref().unwrap();
        assert_eq!(sns.region, "us-west-1");
        assert!(sns.identity.is_none());
        assert_eq!(
            config.metrics.push_gateway.as_deref(),
            Some("http://pushgateway:9091")
        );
    }

    #[test]
    fn test_deserialize_missing_buckets_fails() {
        let toml = r#"
[task_queue]
kind = "gcp_pubsub"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_unknown_queue_kind_fails() {
        let toml = MINIMAL.replace("kind = \"gcp_pubsub\"", "kind = \"kafka\"");
        let result: Result<Config, _> = toml::from_str(&toml);
        assert!(result.is_err());
    }
}
