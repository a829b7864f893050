//! Prometheus metrics for scheduling passes.
//!
//! The binary is short-lived, so instead of serving a scrape endpoint it
//! pushes the registry to a push gateway once a pass finishes.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Job name used on the push gateway.
pub const PUSH_JOB: &str = "workflow-manager";

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
    registry
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Tasks published and marked, by kind.
pub static TASKS_SCHEDULED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "workflow_manager_tasks_scheduled_total",
            "Tasks successfully enqueued",
        ),
        &["kind"], // "intake", "aggregate"
    )
    .unwrap()
});

/// Tasks skipped because their marker already exists.
pub static TASKS_ALREADY_SCHEDULED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "workflow_manager_tasks_already_scheduled_total",
            "Ready batches skipped because a task marker exists",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Enqueue failures by task kind and error kind.
pub static ENQUEUE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "workflow_manager_enqueue_failures_total",
            "Tasks that could not be enqueued",
        ),
        &["kind", "error"],
    )
    .unwrap()
});

/// Marker writes that failed after a successful enqueue.
pub static MARKER_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "workflow_manager_marker_write_failures_total",
            "Task markers that could not be written",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Pass Metrics
// =============================================================================

pub static LAST_SUCCESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "workflow_manager_last_success_seconds",
        "Unix time of the last pass that completed without errors",
    )
    .unwrap()
});

pub static LAST_FAILURE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "workflow_manager_last_failure_seconds",
        "Unix time of the last pass that reported an error",
    )
    .unwrap()
});

pub static PASS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "workflow_manager_pass_duration_seconds",
            "Duration of a scheduling pass",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_SCHEDULED.clone()),
        Box::new(TASKS_ALREADY_SCHEDULED.clone()),
        Box::new(ENQUEUE_FAILURES.clone()),
        Box::new(MARKER_WRITE_FAILURES.clone()),
        Box::new(LAST_SUCCESS.clone()),
        Box::new(LAST_FAILURE.clone()),
        Box::new(PASS_DURATION.clone()),
    ]
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Push gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Push gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Encode the registry in the text exposition format.
pub fn encode_metrics() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Replace this job's metrics on the push gateway at `gateway`.
pub async fn push_metrics(
    client: &reqwest::Client,
    gateway: &str,
    timeout: Duration,
) -> Result<(), PushError> {
    let url = format!("{}/metrics/job/{}", gateway.trim_end_matches('/'), PUSH_JOB);
    let body = encode_metrics()?;

    let response = client
        .put(&url)
        .header("Content-Type", TextEncoder::new().format_type())
        .timeout(timeout)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PushError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    debug!(url = %url, "Pushed metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_registry_encodes_counters() {
        TASKS_SCHEDULED.with_label_values(&["intake"]).inc();
        let text = String::from_utf8(encode_metrics().unwrap()).unwrap();
        assert!(text.contains("workflow_manager_tasks_scheduled_total"));
    }

    #[tokio::test]
    async fn test_push_metrics() {
        LAST_SUCCESS.set(1_600_000_000);
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/metrics/job/workflow-manager"))
            .and(body_string_contains("workflow_manager_last_success_seconds"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        push_metrics(&reqwest::Client::new(), &server.uri(), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_metrics_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let err = push_metrics(&reqwest::Client::new(), &server.uri(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Status { status: 500, .. }));
    }
}
