//! Amazon S3 backend over the REST API with SigV4 signing.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Url};
use tracing::debug;

use super::{ListPage, ObjectStore, StorageError};
use crate::cloud::sigv4::{self, SignableRequest, SigningScope};
use crate::cloud::{xml, AwsCredentialsProvider};

const BACKEND: &str = "S3";

/// A single S3 bucket.
///
/// Requests go to the virtual-hosted endpoint `{bucket}.s3.{region}.amazonaws.com`
/// unless an endpoint override is set, in which case path-style addressing is
/// used against the override.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    region: String,
    bucket: String,
    endpoint: Option<String>,
    credentials: AwsCredentialsProvider,
    name: String,
}

/// Where one request goes.
struct Target {
    base: String,
    host: String,
    path: String,
}

impl S3Store {
    pub fn new(
        client: Client,
        region: impl Into<String>,
        bucket: impl Into<String>,
        credentials: AwsCredentialsProvider,
    ) -> Self {
        let region = region.into();
        let bucket = bucket.into();
        Self {
            client,
            name: format!("s3://{}/{}", region, bucket),
            region,
            bucket,
            endpoint: None,
            credentials,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    fn target(&self, key: Option<&str>) -> Result<Target, StorageError> {
        let object_path = key.map(sigv4::uri_encode_path);
        match &self.endpoint {
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.bucket, self.region);
                Ok(Target {
                    base: format!("https://{}", host),
                    host,
                    path: object_path.unwrap_or_else(|| "/".to_string()),
                })
            }
            Some(endpoint) => {
                let url = Url::parse(endpoint).map_err(|e| StorageError::MalformedUrl {
                    url: endpoint.clone(),
                    reason: e.to_string(),
                })?;
                let host = match (url.host_str(), url.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_string(),
                    (None, _) => {
                        return Err(StorageError::MalformedUrl {
                            url: endpoint.clone(),
                            reason: "missing host".to_string(),
                        })
                    }
                };
                Ok(Target {
                    base: endpoint.clone(),
                    host,
                    path: format!(
                        "/{}{}",
                        sigv4::uri_encode(&self.bucket, false),
                        object_path.unwrap_or_default()
                    ),
                })
            }
        }
    }

    /// Sign and send a request, returning the response body on success.
    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        payload: Vec<u8>,
    ) -> Result<String, StorageError> {
        let credentials = self.credentials.credentials().await?;
        let target = self.target(key)?;

        let signed = sigv4::sign(
            &SignableRequest {
                method: method.as_str(),
                host: &target.host,
                path: &target.path,
                query,
                headers: &[],
                payload: &payload,
            },
            &credentials,
            SigningScope {
                region: &self.region,
                service: "s3",
                sign_content_sha256: true,
            },
            Utc::now(),
        );

        let mut url = format!("{}{}", target.base, target.path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&sigv4::canonical_query_string(query));
        }

        let mut request = self.client.request(method, &url).body(payload);
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(BACKEND, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::from_reqwest(BACKEND, e))?;

        if !status.is_success() {
            let message = match (xml::element(&body, "Code"), xml::element(&body, "Message")) {
                (Some(code), Some(message)) => format!("HTTP {} {}: {}", status, code, message),
                _ => format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            };
            return Err(StorageError::api(BACKEND, message));
        }
        Ok(body)
    }
}

/// Parse a `ListBucketResult` document.
fn parse_list_response(body: &str) -> Result<ListPage, StorageError> {
    let keys = xml::elements(body, "Key");
    let truncated = xml::element(body, "IsTruncated").as_deref() == Some("true");
    let next_page_token = if truncated {
        let token = xml::element(body, "NextContinuationToken").ok_or_else(|| {
            StorageError::parse(BACKEND, "truncated listing without NextContinuationToken")
        })?;
        Some(token)
    } else {
        None
    };
    Ok(ListPage {
        keys,
        next_page_token,
    })
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        if let Some(prefix) = prefix {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(page_token) = page_token {
            query.push(("continuation-token".to_string(), page_token.to_string()));
        }

        debug!(bucket = %self.bucket, ?prefix, "Listing S3 objects");
        let body = self.send(Method::GET, None, &query, Vec::new()).await?;
        parse_list_response(&body)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.send(Method::PUT, Some(key), &[], body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::AwsCredentials;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> AwsCredentialsProvider {
        AwsCredentialsProvider::Static(AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            expires_at: None,
        })
    }

    fn store(server: &MockServer) -> S3Store {
        S3Store::new(Client::new(), "us-west-1", "peer-validation", credentials())
            .with_endpoint(server.uri())
    }

    #[test]
    fn test_virtual_hosted_target() {
        let store = S3Store::new(Client::new(), "us-west-1", "bucket", credentials());
        let target = store.target(Some("task-markers/intake-x")).unwrap();
        assert_eq!(target.base, "https://bucket.s3.us-west-1.amazonaws.com");
        assert_eq!(target.host, "bucket.s3.us-west-1.amazonaws.com");
        assert_eq!(target.path, "/task-markers/intake-x");
        assert_eq!(store.name(), "s3://us-west-1/bucket");
    }

    #[test]
    fn test_path_style_target() {
        let store = S3Store::new(Client::new(), "us-west-1", "bucket", credentials())
            .with_endpoint("http://127.0.0.1:9000/");
        let target = store.target(None).unwrap();
        assert_eq!(target.base, "http://127.0.0.1:9000");
        assert_eq!(target.host, "127.0.0.1:9000");
        assert_eq!(target.path, "/bucket");
    }

    #[test]
    fn test_parse_truncated_listing() {
        let body = r#"<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>a/b.batch</Key></Contents>
  <Contents><Key>a/b.batch.avro</Key></Contents>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
</ListBucketResult>"#;
        let page = parse_list_response(body).unwrap();
        assert_eq!(page.keys, vec!["a/b.batch", "a/b.batch.avro"]);
        assert_eq!(
            page.next_page_token.as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
    }

    #[test]
    fn test_parse_truncated_without_token() {
        let body = "<ListBucketResult><IsTruncated>true</IsTruncated></ListBucketResult>";
        assert!(matches!(
            parse_list_response(body),
            Err(StorageError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_page_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/peer-validation"))
            .and(query_param("list-type", "2"))
            .and(query_param("continuation-token", "tok/1="))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-content-sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>task-markers/aggregate-x</Key></Contents></ListBucketResult>",
            ))
            .mount(&server)
            .await;

        let page = store(&server)
            .list_page(None, Some("tok/1="))
            .await
            .unwrap();
        assert_eq!(page.keys, vec!["task-markers/aggregate-x"]);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_put_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/peer-validation/task-markers/intake-x"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put_object("task-markers/intake-x", b"intake-x".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let err = store(&server).list_page(None, None).await.unwrap_err();
        match err {
            StorageError::Api { message, .. } => {
                assert!(message.contains("AccessDenied"));
                assert!(message.contains("Access Denied"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
