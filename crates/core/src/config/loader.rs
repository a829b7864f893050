use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables that override file settings. Nested keys
/// are separated by `__`, e.g. `WORKFLOW_MANAGER_SCHEDULER__MAX_ENQUEUE_WORKERS`.
pub const ENV_PREFIX: &str = "WORKFLOW_MANAGER_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskQueueKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[buckets.ingestion]
url = "gs://ingestion"

[buckets.own_validation]
url = "gs://own-validation"

[buckets.peer_validation]
url = "gs://peer-validation"

[task_queue]
kind = "gcp_pubsub"

[task_queue.gcp_pubsub]
project = "prio-project"
intake_topic = "intake"
aggregate_topic = "aggregate"
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let config = load_config_from_str(VALID).unwrap();
        assert_eq!(config.buckets.own_validation.url, "gs://own-validation");
        assert_eq!(config.task_queue.kind, TaskQueueKind::GcpPubsub);
    }

    #[test]
    fn test_load_config_from_str_missing_queue() {
        let toml = r#"
[buckets.ingestion]
url = "gs://ingestion"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/workflow-manager.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "is_first = true\n{}", VALID).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert!(config.is_first);
        assert_eq!(config.buckets.ingestion.url, "gs://ingestion");
        assert_eq!(config.scheduler.max_enqueue_workers, 100);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("workflow-manager.toml", VALID)?;
            jail.set_env("WORKFLOW_MANAGER_DRY_RUN", "true");
            jail.set_env("WORKFLOW_MANAGER_SCHEDULER__MAX_ENQUEUE_WORKERS", "7");

            let config = load_config(Path::new("workflow-manager.toml"))
                .map_err(|e| e.to_string())?;
            assert!(config.dry_run);
            assert_eq!(config.scheduler.max_enqueue_workers, 7);
            Ok(())
        });
    }
}
