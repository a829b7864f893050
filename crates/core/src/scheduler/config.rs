use chrono::Duration;

use crate::batch::validity_infix;
use crate::config::Config;

/// Runtime settings of a scheduling pass.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// First of the two servers: our validations use `validity_0`.
    pub is_first: bool,
    pub max_enqueue_workers: usize,
    pub intake_max_age: Duration,
    pub aggregation_period: Duration,
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            is_first: false,
            max_enqueue_workers: 100,
            intake_max_age: Duration::hours(1),
            aggregation_period: Duration::hours(3),
            grace_period: Duration::hours(1),
        }
    }
}

impl SchedulerConfig {
    pub fn own_validity_infix(&self) -> String {
        validity_infix(if self.is_first { 0 } else { 1 })
    }

    pub fn peer_validity_infix(&self) -> String {
        validity_infix(if self.is_first { 1 } else { 0 })
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        let secs = |value: u64| {
            Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000))
        };
        Self {
            is_first: config.is_first,
            max_enqueue_workers: config.scheduler.max_enqueue_workers,
            intake_max_age: secs(config.scheduler.intake_max_age_secs),
            aggregation_period: secs(config.scheduler.aggregation_period_secs),
            grace_period: secs(config.scheduler.grace_period_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_infixes_swap() {
        let first = SchedulerConfig {
            is_first: true,
            ..Default::default()
        };
        assert_eq!(first.own_validity_infix(), "validity_0");
        assert_eq!(first.peer_validity_infix(), "validity_1");

        let second = SchedulerConfig::default();
        assert_eq!(second.own_validity_infix(), "validity_1");
        assert_eq!(second.peer_validity_infix(), "validity_0");
    }

    #[test]
    fn test_from_config() {
        let toml = r#"
is_first = true

[buckets.ingestion]
url = "gs://a"
[buckets.own_validation]
url = "gs://b"
[buckets.peer_validation]
url = "gs://c"

[scheduler]
max_enqueue_workers = 4
grace_period_secs = 600

[task_queue]
kind = "gcp_pubsub"
"#;
        let config = crate::config::load_config_from_str(toml).unwrap();
        let scheduler = SchedulerConfig::from(&config);
        assert!(scheduler.is_first);
        assert_eq!(scheduler.max_enqueue_workers, 4);
        assert_eq!(scheduler.grace_period, Duration::minutes(10));
        assert_eq!(scheduler.aggregation_period, Duration::hours(3));
        assert_eq!(scheduler.intake_max_age, Duration::hours(1));
    }
}
