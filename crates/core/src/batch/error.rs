//! Error types for batch key parsing.

use thiserror::Error;

/// Errors raised while turning object keys into batch paths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchPathError {
    /// The key does not have exactly five date components between the
    /// aggregation ID and the batch ID.
    #[error("malformed date in batch path {key}: expected 5 components, found {found}")]
    MalformedDate { key: String, found: usize },

    /// A date component is not a number.
    #[error("non-numeric date component {component:?} in batch path {key}")]
    NonNumericComponent { key: String, component: String },

    /// The components are numeric but do not name a real instant.
    #[error("invalid date in batch path {key}")]
    InvalidDate { key: String },
}

impl BatchPathError {
    /// The key that failed to parse.
    pub fn key(&self) -> &str {
        match self {
            Self::MalformedDate { key, .. }
            | Self::NonNumericComponent { key, .. }
            | Self::InvalidDate { key } => key,
        }
    }
}
