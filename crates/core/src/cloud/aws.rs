//! AWS credentials: ambient environment keys or a role assumed with a GCP
//! identity token.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::gcp::MetadataClient;
use super::{xml, CredentialsError};

/// Audience of the GCP identity token exchanged with STS.
pub const WEB_IDENTITY_AUDIENCE: &str = "sts.amazonaws.com/gke-identity-federation";

/// Global STS endpoint.
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com";

const ROLE_SESSION_NAME: &str = "workflow-manager";

/// Refresh assumed credentials this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// A set of AWS request-signing credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AwsCredentials {
    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| CredentialsError::MissingEnv("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| CredentialsError::MissingEnv("AWS_SECRET_ACCESS_KEY"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
            expires_at: None,
        })
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

/// Where AWS credentials come from.
#[derive(Debug, Clone)]
pub enum AwsCredentialsProvider {
    /// Read from the environment on every request.
    Environment,
    /// Fixed credentials, used against emulators and in tests.
    Static(AwsCredentials),
    /// Assume a role using the workload's GCP identity.
    WebIdentity(Arc<WebIdentityProvider>),
}

impl AwsCredentialsProvider {
    /// Pick a provider for an optional identity (role ARN). An empty identity
    /// means the ambient credentials.
    pub fn for_identity(identity: Option<&str>, client: Client, metadata: MetadataClient) -> Self {
        match identity.filter(|i| !i.is_empty()) {
            Some(role_arn) => Self::WebIdentity(Arc::new(WebIdentityProvider::new(
                role_arn, client, metadata,
            ))),
            None => Self::Environment,
        }
    }

    pub async fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        match self {
            Self::Environment => AwsCredentials::from_env(),
            Self::Static(credentials) => Ok(credentials.clone()),
            Self::WebIdentity(provider) => provider.credentials().await,
        }
    }
}

/// Exchanges a GCP identity token for temporary credentials of an AWS role.
#[derive(Debug)]
pub struct WebIdentityProvider {
    role_arn: String,
    client: Client,
    metadata: MetadataClient,
    sts_endpoint: String,
    cached: RwLock<Option<AwsCredentials>>,
}

impl WebIdentityProvider {
    pub fn new(role_arn: impl Into<String>, client: Client, metadata: MetadataClient) -> Self {
        Self {
            role_arn: role_arn.into(),
            client,
            metadata,
            sts_endpoint: DEFAULT_STS_ENDPOINT.to_string(),
            cached: RwLock::new(None),
        }
    }

    pub fn with_sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sts_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Cached credentials, re-assuming the role when they near expiry.
    pub async fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        let now = Utc::now();
        if let Some(credentials) = self.cached.read().await.as_ref() {
            if credentials.is_fresh(now) {
                return Ok(credentials.clone());
            }
        }

        let mut guard = self.cached.write().await;
        if let Some(credentials) = guard.as_ref() {
            if credentials.is_fresh(now) {
                return Ok(credentials.clone());
            }
        }

        let fresh = self.assume_role().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    async fn assume_role(&self) -> Result<AwsCredentials, CredentialsError> {
        debug!(role_arn = %self.role_arn, "Fetching GCP identity token for STS");
        let token = self.metadata.identity_token(WEB_IDENTITY_AUDIENCE).await?;

        let assume_err = |reason: String| CredentialsError::AssumeRole {
            role_arn: self.role_arn.clone(),
            reason,
        };

        let response = self
            .client
            .get(format!("{}/", self.sts_endpoint))
            .query(&[
                ("Action", "AssumeRoleWithWebIdentity"),
                ("DurationSeconds", "3600"),
                ("RoleArn", self.role_arn.as_str()),
                ("RoleSessionName", ROLE_SESSION_NAME),
                ("Version", "2011-06-15"),
                ("WebIdentityToken", token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| assume_err(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| assume_err(e.to_string()))?;
        if !status.is_success() {
            let reason = xml::element(&body, "Message")
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(assume_err(format!("HTTP {}: {}", status, reason)));
        }

        let credentials = parse_assume_role_response(&body)?;
        info!(
            role_arn = %self.role_arn,
            expires_at = ?credentials.expires_at,
            "Assumed AWS role with web identity"
        );
        Ok(credentials)
    }
}

/// Pull the credentials out of an `AssumeRoleWithWebIdentityResponse`.
fn parse_assume_role_response(body: &str) -> Result<AwsCredentials, CredentialsError> {
    let field = |tag: &str| {
        xml::element(body, tag)
            .ok_or_else(|| CredentialsError::Parse(format!("missing <{}> in STS response", tag)))
    };

    let expires_at = field("Expiration")?
        .parse::<DateTime<Utc>>()
        .map_err(|e| CredentialsError::Parse(format!("bad expiration: {}", e)))?;

    Ok(AwsCredentials {
        access_key_id: field("AccessKeyId")?,
        secret_access_key: field("SecretAccessKey")?,
        session_token: Some(field("SessionToken")?),
        expires_at: Some(expires_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STS_RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <Credentials>
      <SessionToken>session-token</SessionToken>
      <SecretAccessKey>secret-key</SecretAccessKey>
      <Expiration>2099-10-24T23:00:23Z</Expiration>
      <AccessKeyId>ASIAEXAMPLE</AccessKeyId>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
</AssumeRoleWithWebIdentityResponse>"#;

    #[test]
    fn test_parse_assume_role_response() {
        let credentials = parse_assume_role_response(STS_RESPONSE).unwrap();
        assert_eq!(credentials.access_key_id, "ASIAEXAMPLE");
        assert_eq!(credentials.secret_access_key, "secret-key");
        assert_eq!(credentials.session_token.as_deref(), Some("session-token"));
        assert!(credentials.expires_at.is_some());
    }

    #[test]
    fn test_parse_assume_role_response_missing_field() {
        let err = parse_assume_role_response("<Credentials></Credentials>").unwrap_err();
        assert!(matches!(err, CredentialsError::Parse(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = parse_assume_role_response(STS_RESPONSE).unwrap();
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("ASIAEXAMPLE"));
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("session-token"));
    }

    #[test]
    fn test_for_identity_selects_provider() {
        let metadata = MetadataClient::new(Client::new());
        let provider = AwsCredentialsProvider::for_identity(None, Client::new(), metadata.clone());
        assert!(matches!(provider, AwsCredentialsProvider::Environment));

        let provider =
            AwsCredentialsProvider::for_identity(Some(""), Client::new(), metadata.clone());
        assert!(matches!(provider, AwsCredentialsProvider::Environment));

        let provider = AwsCredentialsProvider::for_identity(
            Some("arn:aws:iam::123456789012:role/facilitator"),
            Client::new(),
            metadata,
        );
        match provider {
            AwsCredentialsProvider::WebIdentity(p) => {
                assert_eq!(p.role_arn(), "arn:aws:iam::123456789012:role/facilitator")
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_web_identity_exchange_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/computeMetadata/v1/instance/service-accounts/default/identity",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("gcp-jwt"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "AssumeRoleWithWebIdentity"))
            .and(query_param("WebIdentityToken", "gcp-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STS_RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = MetadataClient::with_base_url(Client::new(), server.uri());
        let provider = WebIdentityProvider::new("arn:aws:iam::1:role/r", Client::new(), metadata)
            .with_sts_endpoint(server.uri());

        let first = provider.credentials().await.unwrap();
        let second = provider.credentials().await.unwrap();
        assert_eq!(first.access_key_id, "ASIAEXAMPLE");
        assert_eq!(second.access_key_id, "ASIAEXAMPLE");
    }

    #[tokio::test]
    async fn test_web_identity_sts_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/computeMetadata/v1/instance/service-accounts/default/identity",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("gcp-jwt"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<ErrorResponse><Error><Message>Not authorized</Message></Error></ErrorResponse>",
            ))
            .mount(&server)
            .await;

        let metadata = MetadataClient::with_base_url(Client::new(), server.uri());
        let provider = WebIdentityProvider::new("arn:aws:iam::1:role/r", Client::new(), metadata)
            .with_sts_endpoint(server.uri());

        let err = provider.credentials().await.unwrap_err();
        match err {
            CredentialsError::AssumeRole { reason, .. } => {
                assert!(reason.contains("Not authorized"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
