use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::{BucketUrl, ObjectStore, StorageBackend, StorageError};
use crate::batch::TASK_MARKER_PREFIX;
use crate::cloud::CloudContext;

/// A bucket holding batch files and task markers.
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Debug)]
pub struct Bucket<S: ObjectStore = StorageBackend> {
    store: Arc<S>,
    dry_run: bool,
}

impl<S: ObjectStore> Clone for Bucket<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dry_run: self.dry_run,
        }
    }
}

impl Bucket<StorageBackend> {
    /// Open the bucket at `url` (`gs://bucket` or `s3://region/bucket`).
    ///
    /// `identity` is an AWS role ARN to assume for S3 buckets. GCS buckets only
    /// accept the ambient identity. In dry-run mode marker writes are skipped.
    pub fn open(
        url: &str,
        identity: Option<&str>,
        dry_run: bool,
        cloud: &CloudContext,
    ) -> Result<Self, StorageError> {
        let url = BucketUrl::parse(url)?;
        let store = StorageBackend::connect(&url, identity, cloud)?;
        Ok(Self::new(store, dry_run))
    }
}

impl<S: ObjectStore> Bucket<S> {
    pub fn new(store: S, dry_run: bool) -> Self {
        Self {
            store: Arc::new(store),
            dry_run,
        }
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every object key in the bucket, across all pages.
    pub async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        self.list_with_prefix(None).await
    }

    /// Names of the task markers present, without the marker prefix.
    pub async fn list_task_markers(&self) -> Result<HashSet<String>, StorageError> {
        let keys = self.list_with_prefix(Some(TASK_MARKER_PREFIX)).await?;
        let markers: HashSet<String> = keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(TASK_MARKER_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .collect();
        debug!(bucket = %self.name(), count = markers.len(), "Listed task markers");
        Ok(markers)
    }

    /// Record that the task named `marker` was scheduled.
    pub async fn write_task_marker(&self, marker: &str) -> Result<(), StorageError> {
        let key = format!("{}{}", TASK_MARKER_PREFIX, marker);
        if self.dry_run {
            info!(bucket = %self.name(), key = %key, "Dry run, skipping task marker write");
            return Ok(());
        }

        self.store
            .put_object(&key, marker.as_bytes().to_vec())
            .await?;
        debug!(bucket = %self.name(), key = %key, "Wrote task marker");
        Ok(())
    }

    async fn list_with_prefix(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .list_page(prefix, page_token.as_deref())
                .await?;
            pages += 1;
            keys.extend(page.keys);

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    return Err(StorageError::PaginationLoop {
                        bucket: self.name().to_string(),
                        token: next,
                    });
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(
            bucket = %self.name(),
            ?prefix,
            pages,
            count = keys.len(),
            "Listed bucket"
        );
        Ok(keys)
    }
}
