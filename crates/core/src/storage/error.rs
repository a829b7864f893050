//! Error types for the storage module.

use thiserror::Error;

use crate::cloud::CredentialsError;

/// Errors that can occur while talking to a bucket.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No bucket URL was configured.
    #[error("Bucket URL is empty")]
    EmptyUrl,

    /// The URL does not start with `gs://` or `s3://`.
    #[error("Unrecognized bucket URL {0}: expected gs://<bucket> or s3://<region>/<bucket>")]
    UnrecognizedScheme(String),

    /// The URL has a known scheme but is missing parts.
    #[error("Malformed bucket URL {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// An alternate identity was requested for a backend that only supports
    /// ambient credentials.
    #[error("Identity {identity:?} is not supported for bucket {url}")]
    IdentityNotSupported { url: String, identity: String },

    /// Credentials for the backend could not be obtained.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// The request did not complete within the configured timeout.
    #[error("{backend} request timed out")]
    Timeout { backend: &'static str },

    /// The backend returned an error or could not be reached.
    #[error("{backend} API error: {message}")]
    Api {
        backend: &'static str,
        message: String,
    },

    /// The backend answered with something we could not understand.
    #[error("Failed to parse {backend} response: {message}")]
    Parse {
        backend: &'static str,
        message: String,
    },

    /// The backend handed back the same page token twice.
    #[error("Listing {bucket} repeated page token {token}")]
    PaginationLoop { bucket: String, token: String },
}

impl StorageError {
    pub(crate) fn api(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            backend,
            message: message.into(),
        }
    }

    pub(crate) fn parse(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            backend,
            message: message.into(),
        }
    }

    /// Map a transport error from the HTTP client.
    pub(crate) fn from_reqwest(backend: &'static str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout { backend }
        } else {
            Self::api(backend, e.to_string())
        }
    }

    /// Whether the error came from bad configuration rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyUrl
                | Self::UnrecognizedScheme(_)
                | Self::MalformedUrl { .. }
                | Self::IdentityNotSupported { .. }
        )
    }
}
