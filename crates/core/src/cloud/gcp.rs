//! Google Cloud credentials.
//!
//! OAuth access tokens for GCS and Pub/Sub come from `gcp_auth`, which
//! discovers service account keys, gcloud user credentials or the metadata
//! server. Identity tokens for AWS web identity federation are read from the
//! metadata server directly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::debug;

use super::CredentialsError;

/// Default metadata server location on GCE and GKE.
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

/// Scopes requested for Cloud Storage.
pub const GCS_SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

/// Scopes requested for Pub/Sub.
pub const PUBSUB_SCOPES: &[&str] = &["https://www.googleapis.com/auth/pubsub"];

/// Client for the instance metadata server.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_METADATA_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// OIDC identity token for the default service account, minted for `audience`.
    pub async fn identity_token(&self, audience: &str) -> Result<String, CredentialsError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/identity",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", audience), ("format", "full")])
            .send()
            .await
            .map_err(|e| CredentialsError::Metadata(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialsError::Metadata(e.to_string()))?;
        if !status.is_success() {
            return Err(CredentialsError::Metadata(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(body.trim().to_string())
    }
}

/// Application default credentials, discovered on first use and shared by
/// every token source built from the same handle.
#[derive(Clone, Default)]
pub struct AmbientCredentials {
    provider: Arc<OnceCell<Arc<dyn TokenProvider>>>,
}

impl fmt::Debug for AmbientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientCredentials")
            .field("initialized", &self.provider.initialized())
            .finish()
    }
}

impl AmbientCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self) -> Result<&Arc<dyn TokenProvider>, CredentialsError> {
        self.provider
            .get_or_try_init(|| async {
                debug!("Discovering GCP application default credentials");
                gcp_auth::provider()
                    .await
                    .map_err(|e| CredentialsError::GcpAuth(e.to_string()))
            })
            .await
    }
}

/// Source of bearer tokens for Google APIs.
#[derive(Debug, Clone)]
pub struct GcpTokenSource {
    kind: TokenKind,
}

#[derive(Debug, Clone)]
enum TokenKind {
    /// Application default credentials; `gcp_auth` caches and refreshes tokens.
    Ambient {
        credentials: AmbientCredentials,
        scopes: &'static [&'static str],
    },
    /// A fixed token, used against emulators and in tests.
    Fixed(String),
}

impl GcpTokenSource {
    pub fn ambient(credentials: AmbientCredentials, scopes: &'static [&'static str]) -> Self {
        Self {
            kind: TokenKind::Ambient {
                credentials,
                scopes,
            },
        }
    }

    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Fixed(token.into()),
        }
    }

    /// A valid access token.
    pub async fn token(&self) -> Result<String, CredentialsError> {
        match &self.kind {
            TokenKind::Fixed(token) => Ok(token.clone()),
            TokenKind::Ambient {
                credentials,
                scopes,
            } => {
                let token = credentials
                    .provider()
                    .await?
                    .token(*scopes)
                    .await
                    .map_err(|e| CredentialsError::GcpAuth(e.to_string()))?;
                Ok(token.as_str().to_string())
            }
        }
    }
}

/// Build the HTTP client shared by cloud API calls.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}
