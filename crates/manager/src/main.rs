//! Workflow manager: one scheduling pass per invocation.
//!
//! Meant to run as a periodic job. Each run lists the ingestion and
//! validation buckets, enqueues intake and aggregation tasks for whatever is
//! ready, pushes metrics, and exits non-zero if the pass did not complete.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workflow_manager_core::{
    cloud::PUBSUB_SCOPES, config::BucketConfig, load_config, metrics, validate_config, Bucket, CloudContext, Config,
    LogFormat, PubSubPublisher, QueueBackend, Scheduler, SchedulerConfig, SchedulerError,
    SnsPublisher, TaskEnqueuer, TaskKind, TaskQueueKind,
};

#[derive(Debug, Parser)]
#[command(name = "workflow-manager", version, about = "Schedule intake and aggregation tasks")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        env = "WORKFLOW_MANAGER_CONFIG",
        default_value = "workflow-manager.toml"
    )]
    config: PathBuf,

    /// Log what would be scheduled without publishing or writing markers
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        // No-op when logging is already up.
        init_logging(false);
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    init_logging(cli.log_json || config.log_format == LogFormat::Json);
    info!("Loaded configuration from {:?}", cli.config);

    validate_config(&config).context("Configuration validation failed")?;
    config.dry_run |= cli.dry_run;
    if config.dry_run {
        warn!("Dry run: no tasks will be published and no markers written");
    }

    let timeout = Duration::from_secs(config.scheduler.request_timeout_secs);
    let cloud = CloudContext::new(timeout, config.endpoints.clone())
        .context("Failed to build HTTP client")?;

    let scheduler = build_scheduler(&config, &cloud, timeout)?;
    let outcome = scheduler.run_pass(Utc::now()).await;

    if let Some(gateway) = &config.metrics.push_gateway {
        if let Err(e) = metrics::push_metrics(&cloud.client, gateway, timeout).await {
            warn!(gateway = %gateway, error = %e, "Failed to push metrics");
        }
    }

    match outcome {
        Ok(report) => {
            info!(
                intake_scheduled = report.intake.scheduled,
                aggregation_scheduled = report.aggregation.scheduled,
                "Scheduling pass complete"
            );
            Ok(())
        }
        Err(SchedulerError::Incomplete { report, errors }) => {
            for e in &errors {
                error!(error = %e, "Scheduling pass error");
            }
            anyhow::bail!(
                "scheduling pass incomplete: {} error(s), {} intake and {} aggregation tasks scheduled",
                errors.len(),
                report.intake.scheduled,
                report.aggregation.scheduled
            )
        }
        Err(e) => Err(e).context("Scheduling pass failed"),
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();
}

fn build_scheduler(config: &Config, cloud: &CloudContext, timeout: Duration) -> Result<Scheduler> {
    let buckets = &config.buckets;
    let open = |name: &str, bucket: &BucketConfig| {
        info!("Using {} bucket {}", name, bucket.url);
        Bucket::open(&bucket.url, bucket.identity.as_deref(), config.dry_run, cloud)
            .with_context(|| format!("Failed to open {} bucket {}", name, bucket.url))
    };
    let ingestion = open("ingestion", &buckets.ingestion)?;
    let own_validation = open("own validation", &buckets.own_validation)?;
    let peer_validation = open("peer validation", &buckets.peer_validation)?;

    let intake = TaskEnqueuer::new(
        build_publisher(config, cloud, TaskKind::Intake, timeout)?,
        config.dry_run,
    );
    let aggregate = TaskEnqueuer::new(
        build_publisher(config, cloud, TaskKind::Aggregation, timeout)?,
        config.dry_run,
    );
    info!(
        "Publishing intake tasks to {} and aggregation tasks to {}",
        intake.topic(),
        aggregate.topic()
    );

    Ok(Scheduler::new(
        SchedulerConfig::from(config),
        ingestion,
        own_validation,
        peer_validation,
        intake,
        aggregate,
    ))
}

fn build_publisher(
    config: &Config,
    cloud: &CloudContext,
    kind: TaskKind,
    timeout: Duration,
) -> Result<QueueBackend> {
    let queue = &config.task_queue;
    match queue.kind {
        TaskQueueKind::GcpPubsub => {
            let pubsub = queue
                .gcp_pubsub
                .as_ref()
                .context("gcp_pubsub queue selected but no [task_queue.gcp_pubsub] section")?;
            let topic = match kind {
                TaskKind::Intake => &pubsub.intake_topic,
                TaskKind::Aggregation => &pubsub.aggregate_topic,
            };
            let mut publisher = PubSubPublisher::new(
                cloud.client.clone(),
                &pubsub.project,
                topic,
                cloud.gcp_tokens(PUBSUB_SCOPES),
            )
            .with_context(|| format!("Invalid {} topic", kind))?
            .with_attempt_timeout(timeout);
            if let Some(endpoint) = &cloud.endpoints.pubsub {
                publisher = publisher.with_base_url(endpoint.clone());
            }
            Ok(publisher.into())
        }
        TaskQueueKind::AwsSns => {
            let sns = queue
                .aws_sns
                .as_ref()
                .context("aws_sns queue selected but no [task_queue.aws_sns] section")?;
            let topic_arn = match kind {
                TaskKind::Intake => &sns.intake_topic_arn,
                TaskKind::Aggregation => &sns.aggregate_topic_arn,
            };
            let mut publisher = SnsPublisher::new(
                cloud.client.clone(),
                sns.region.clone(),
                topic_arn.clone(),
                cloud.aws_credentials(sns.identity.as_deref()),
            )
            .with_context(|| format!("Invalid {} topic", kind))?;
            if let Some(endpoint) = &cloud.endpoints.sns {
                publisher = publisher.with_endpoint(endpoint.clone());
            }
            Ok(publisher.into())
        }
    }
}
