//! Error types for cloud credential plumbing.

use thiserror::Error;

/// Errors raised while obtaining credentials for a cloud API.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    /// Application default credentials could not be found or refused a token.
    #[error("GCP authentication failed: {0}")]
    GcpAuth(String),

    /// The GCE/GKE metadata server could not be reached or refused the request.
    #[error("Metadata server request failed: {0}")]
    Metadata(String),

    /// STS refused to exchange the web identity token.
    #[error("STS AssumeRoleWithWebIdentity for {role_arn} failed: {reason}")]
    AssumeRole { role_arn: String, reason: String },

    /// A credential response could not be parsed.
    #[error("Failed to parse credential response: {0}")]
    Parse(String),
}
