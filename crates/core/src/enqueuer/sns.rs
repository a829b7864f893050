//! AWS SNS publisher. Each publish is a single signed `Publish` call awaited
//! inline.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};

use super::{Delivery, EnqueueError, Publisher};
use crate::cloud::sigv4::{self, SignableRequest, SigningScope};
use crate::cloud::{xml, AwsCredentialsProvider};

const BACKEND: &str = "SNS";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone)]
pub struct SnsPublisher {
    client: Client,
    region: String,
    topic_arn: String,
    endpoint: String,
    credentials: AwsCredentialsProvider,
}

impl SnsPublisher {
    pub fn new(
        client: Client,
        region: impl Into<String>,
        topic_arn: impl Into<String>,
        credentials: AwsCredentialsProvider,
    ) -> Result<Self, EnqueueError> {
        let region = region.into();
        let topic_arn = topic_arn.into();
        if !topic_arn.starts_with("arn:") {
            return Err(EnqueueError::InvalidTopic {
                topic: topic_arn,
                reason: "expected an SNS topic ARN".to_string(),
            });
        }

        Ok(Self {
            client,
            endpoint: format!("https://sns.{}.amazonaws.com", region),
            region,
            topic_arn,
            credentials,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn host(&self) -> Result<String, EnqueueError> {
        let url = Url::parse(&self.endpoint).map_err(|e| EnqueueError::InvalidTopic {
            topic: self.topic_arn.clone(),
            reason: format!("bad SNS endpoint {}: {}", self.endpoint, e),
        })?;
        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => Ok(format!("{}:{}", host, port)),
            (Some(host), None) => Ok(host.to_string()),
            (None, _) => Err(EnqueueError::InvalidTopic {
                topic: self.topic_arn.clone(),
                reason: format!("SNS endpoint {} has no host", self.endpoint),
            }),
        }
    }
}

/// Form-encode `Publish` parameters.
fn publish_form(topic_arn: &str, message: &str) -> String {
    [
        ("Action", "Publish"),
        ("Message", message),
        ("TopicArn", topic_arn),
        ("Version", "2010-03-31"),
    ]
    .iter()
    .map(|(k, v)| format!("{}={}", k, sigv4::uri_encode(v, false)))
    .collect::<Vec<_>>()
    .join("&")
}

#[async_trait]
impl Publisher for SnsPublisher {
    fn name(&self) -> &str {
        &self.topic_arn
    }

    fn delivery(&self) -> Delivery {
        Delivery::Inline
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), EnqueueError> {
        let message = String::from_utf8(payload).map_err(|e| EnqueueError::Publish {
            backend: BACKEND,
            status: None,
            message: format!("SNS messages must be UTF-8: {}", e),
        })?;
        let body = publish_form(&self.topic_arn, &message);
        let credentials = self.credentials.credentials().await?;
        let host = self.host()?;

        let headers = vec![("content-type".to_string(), CONTENT_TYPE.to_string())];
        let signed = sigv4::sign(
            &SignableRequest {
                method: "POST",
                host: &host,
                path: "/",
                query: &[],
                headers: &headers,
                payload: body.as_bytes(),
            },
            &credentials,
            SigningScope {
                region: &self.region,
                service: "sns",
                sign_content_sha256: false,
            },
            Utc::now(),
        );

        let mut request = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("content-type", CONTENT_TYPE)
            .body(body);
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EnqueueError::from_reqwest(BACKEND, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = xml::element(&body, "Message")
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(EnqueueError::Publish {
                backend: BACKEND,
                status: Some(status.as_u16()),
                message,
            });
        }
        Ok(())
    }
}
