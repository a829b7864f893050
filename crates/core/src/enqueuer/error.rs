//! Error types for the enqueuer module.

use thiserror::Error;

use crate::cloud::CredentialsError;

/// Errors that can occur while publishing a task.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The task could not be serialized. Never retried.
    #[error("Failed to serialize task: {0}")]
    Marshal(#[from] serde_json::Error),

    /// Credentials for the queue backend could not be obtained.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// A publish attempt did not complete in time.
    #[error("{backend} publish timed out")]
    Timeout { backend: &'static str },

    /// The backend could not be reached or rejected the message.
    #[error("{backend} publish failed: {message}")]
    Publish {
        backend: &'static str,
        /// HTTP status, `None` when the request never got a response.
        status: Option<u16>,
        message: String,
    },

    /// The configured topic is not usable.
    #[error("Invalid topic {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },
}

impl EnqueueError {
    pub(crate) fn from_reqwest(backend: &'static str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout { backend }
        } else {
            Self::Publish {
                backend,
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }

    /// Transport failures, throttling and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Publish { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            Self::Marshal(_) | Self::Credentials(_) | Self::InvalidTopic { .. } => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Marshal(_) => "marshal",
            Self::Credentials(_) => "credentials",
            Self::Timeout { .. } => "timeout",
            Self::Publish { .. } => "publish",
            Self::InvalidTopic { .. } => "topic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(status: Option<u16>) -> EnqueueError {
        EnqueueError::Publish {
            backend: "test",
            status,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EnqueueError::Timeout { backend: "test" }.is_retryable());
        assert!(publish(None).is_retryable());
        assert!(publish(Some(503)).is_retryable());
        assert!(publish(Some(429)).is_retryable());
        assert!(!publish(Some(400)).is_retryable());
        assert!(!publish(Some(403)).is_retryable());
    }

    #[test]
    fn test_marshal_is_not_retryable() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = EnqueueError::from(err);
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "marshal");
    }
}
