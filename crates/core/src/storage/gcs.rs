//! Google Cloud Storage backend over the JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ListPage, ObjectStore, StorageError};
use crate::cloud::GcpTokenSource;

/// Public JSON API endpoint.
pub const GCS_API_URL: &str = "https://storage.googleapis.com";

const BACKEND: &str = "GCS";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

/// A single GCS bucket.
#[derive(Debug, Clone)]
pub struct GcsStore {
    client: Client,
    bucket: String,
    base_url: String,
    tokens: GcpTokenSource,
    name: String,
}

impl GcsStore {
    pub fn new(client: Client, bucket: impl Into<String>, tokens: GcpTokenSource) -> Self {
        let bucket = bucket.into();
        Self {
            client,
            name: format!("gs://{}", bucket),
            bucket,
            base_url: GCS_API_URL.to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn error_from_response(response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::api(
            BACKEND,
            format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ),
        )
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(&self.bucket)
        );

        let mut query: Vec<(&str, &str)> = vec![("fields", "items(name),nextPageToken")];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token));
        }

        debug!(bucket = %self.bucket, ?prefix, "Listing GCS objects");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| StorageError::parse(BACKEND, e.to_string()))?;

        Ok(ListPage {
            keys: body.items.into_iter().map(|item| item.name).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(&self.bucket)
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", key)])
            .header("Content-Type", "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> GcsStore {
        GcsStore::new(Client::new(), "ingestion", GcpTokenSource::fixed("tok"))
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/ingestion/o"))
            .and(header("Authorization", "Bearer tok"))
            .and(query_param("prefix", "task-markers/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"name": "task-markers/intake-a"},
                    {"name": "task-markers/intake-b"}
                ],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let page = store(&server)
            .list_page(Some("task-markers/"), None)
            .await
            .unwrap();
        assert_eq!(page.keys, vec!["task-markers/intake-a", "task-markers/intake-b"]);
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    }

    #[tokio::test]
    async fn test_list_empty_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/ingestion/o"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let page = store(&server).list_page(None, None).await.unwrap();
        assert!(page.keys.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = store(&server).list_page(None, None).await.unwrap_err();
        match err {
            StorageError::Api { backend, message } => {
                assert_eq!(backend, "GCS");
                assert!(message.contains("403"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/ingestion/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "task-markers/intake-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "task-markers/intake-a"
            })))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put_object("task-markers/intake-a", b"intake-a".to_vec())
            .await
            .unwrap();
    }
}
