//! Trait definitions for the storage module.

use async_trait::async_trait;

use super::StorageError;

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` on the last page.
    pub next_page_token: Option<String>,
}

/// The two operations the scheduler needs from an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Short name of the backend, used in logs.
    fn name(&self) -> &str;

    /// List one page of object keys under `prefix`, continuing from `page_token`.
    async fn list_page(
        &self,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    /// Create or overwrite the object at `key`.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;
}
