//! Credential plumbing shared by the cloud storage and queue backends.
//!
//! Google APIs are called with OAuth bearer tokens from application default
//! credentials.
//! AWS APIs are signed with SigV4, using either ambient environment keys or
//! temporary keys for a role assumed with the workload's GCP identity.

pub mod aws;
mod error;
pub mod gcp;
pub mod sigv4;
pub mod xml;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

pub use aws::{AwsCredentials, AwsCredentialsProvider, WebIdentityProvider};
pub use error::CredentialsError;
pub use gcp::{
    http_client, AmbientCredentials, GcpTokenSource, MetadataClient, GCS_SCOPES, PUBSUB_SCOPES,
};

/// Base URL overrides for the cloud APIs. `None` means the public endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    pub gcs: Option<String>,
    pub s3: Option<String>,
    pub pubsub: Option<String>,
    pub sns: Option<String>,
    pub sts: Option<String>,
    pub metadata: Option<String>,
}

/// Shared HTTP client and credential sources handed to every backend.
#[derive(Debug, Clone)]
pub struct CloudContext {
    pub client: Client,
    pub metadata: MetadataClient,
    pub gcp: AmbientCredentials,
    pub endpoints: Endpoints,
}

impl CloudContext {
    pub fn new(timeout: Duration, endpoints: Endpoints) -> Result<Self, reqwest::Error> {
        let client = http_client(timeout)?;
        let metadata = match &endpoints.metadata {
            Some(url) => MetadataClient::with_base_url(client.clone(), url.clone()),
            None => MetadataClient::new(client.clone()),
        };
        Ok(Self {
            client,
            metadata,
            gcp: AmbientCredentials::new(),
            endpoints,
        })
    }

    /// Token source for Google APIs using application default credentials.
    pub fn gcp_tokens(&self, scopes: &'static [&'static str]) -> GcpTokenSource {
        GcpTokenSource::ambient(self.gcp.clone(), scopes)
    }

    /// AWS credentials for an optional role ARN.
    pub fn aws_credentials(&self, identity: Option<&str>) -> AwsCredentialsProvider {
        let Some(sts) = &self.endpoints.sts else {
            return AwsCredentialsProvider::for_identity(
                identity,
                self.client.clone(),
                self.metadata.clone(),
            );
        };
        match identity.filter(|i| !i.is_empty()) {
            Some(role_arn) => AwsCredentialsProvider::WebIdentity(Arc::new(
                WebIdentityProvider::new(role_arn, self.client.clone(), self.metadata.clone())
                    .with_sts_endpoint(sts.clone()),
            )),
            None => AwsCredentialsProvider::Environment,
        }
    }
}
