use async_trait::async_trait;

use super::{BucketUrl, GcsStore, ListPage, ObjectStore, S3Store, StorageError};
use crate::cloud::{CloudContext, GCS_SCOPES};

/// The object stores a bucket URL can resolve to.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs(GcsStore),
    S3(S3Store),
}

impl StorageBackend {
    /// Build the backend for `url`, authenticating as `identity` where supported.
    pub fn connect(
        url: &BucketUrl,
        identity: Option<&str>,
        cloud: &CloudContext,
    ) -> Result<Self, StorageError> {
        url.check_identity(identity)?;

        match url {
            BucketUrl::Gcs { bucket } => {
                let mut store =
                    GcsStore::new(cloud.client.clone(), bucket, cloud.gcp_tokens(GCS_SCOPES));
                if let Some(endpoint) = &cloud.endpoints.gcs {
                    store = store.with_base_url(endpoint);
                }
                Ok(Self::Gcs(store))
            }
            BucketUrl::S3 { region, bucket } => {
                let mut store = S3Store::new(
                    cloud.client.clone(),
                    region,
                    bucket,
                    cloud.aws_credentials(identity),
                );
                if let Some(endpoint) = &cloud.endpoints.s3 {
                    store = store.with_endpoint(endpoint);
                }
                Ok(Self::S3(store))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageBackend {
    fn name(&self) -> &str {
        match self {
            Self::Gcs(store) => store.name(),
            Self::S3(store) => store.name(),
        }
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        match self {
            Self::Gcs(store) => store.list_page(prefix, page_token).await,
            Self::S3(store) => store.list_page(prefix, page_token).await,
        }
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        match self {
            Self::Gcs(store) => store.put_object(key, body).await,
            Self::S3(store) => store.put_object(key, body).await,
        }
    }
}
