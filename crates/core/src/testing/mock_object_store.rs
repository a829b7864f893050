//! Mock object store for testing.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{ListPage, ObjectStore, StorageError};

/// A recorded object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    pub key: String,
    pub body: Vec<u8>,
}

/// In-memory implementation of [`ObjectStore`].
///
/// Provides controllable behavior for testing:
/// - Paged listings with a configurable page size
/// - Recorded writes for assertions
/// - Injected listing and write failures
///
/// Clones share state, so a test can keep a handle after moving the store
/// into a [`Bucket`](crate::storage::Bucket).
#[derive(Debug, Clone)]
pub struct MockObjectStore {
    name: String,
    page_size: usize,
    objects: Arc<RwLock<BTreeSet<String>>>,
    puts: Arc<RwLock<Vec<RecordedPut>>>,
    list_calls: Arc<AtomicUsize>,
    list_error: Arc<RwLock<Option<String>>>,
    put_error: Arc<RwLock<Option<String>>>,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::named("mock://bucket")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: 1000,
            objects: Arc::new(RwLock::new(BTreeSet::new())),
            puts: Arc::new(RwLock::new(Vec::new())),
            list_calls: Arc::new(AtomicUsize::new(0)),
            list_error: Arc::new(RwLock::new(None)),
            put_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Split listings into pages of at most `page_size` keys.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn insert(&self, key: impl Into<String>) {
        self.objects.write().await.insert(key.into());
    }

    pub async fn insert_all<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut objects = self.objects.write().await;
        objects.extend(keys.into_iter().map(Into::into));
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains(key)
    }

    /// Keys written through `put_object`, in call order.
    pub async fn puts(&self) -> Vec<String> {
        self.puts.read().await.iter().map(|p| p.key.clone()).collect()
    }

    pub async fn recorded_puts(&self) -> Vec<RecordedPut> {
        self.puts.read().await.clone()
    }

    /// Number of `list_page` calls made.
    pub async fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every listing fail with `message`.
    pub async fn fail_listing(&self, message: impl Into<String>) {
        *self.list_error.write().await = Some(message.into());
    }

    /// Make every write fail with `message`.
    pub async fn fail_puts(&self, message: impl Into<String>) {
        *self.put_error.write().await = Some(message.into());
    }

    /// Clear injected failures.
    pub async fn heal(&self) {
        *self.list_error.write().await = None;
        *self.put_error.write().await = None;
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_error.read().await.clone() {
            return Err(StorageError::api("mock", message));
        }

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StorageError::parse("mock", format!("bad page token {}", token)))?,
            None => 0,
        };

        let objects = self.objects.read().await;
        let matching: Vec<&String> = objects
            .iter()
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .collect();

        let keys: Vec<String> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|key| key.to_string())
            .collect();
        let next = offset + keys.len();
        let next_page_token = (next < matching.len()).then(|| next.to_string());

        Ok(ListPage {
            keys,
            next_page_token,
        })
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        if let Some(message) = self.put_error.read().await.clone() {
            return Err(StorageError::api("mock", message));
        }

        self.puts.write().await.push(RecordedPut {
            key: key.to_string(),
            body,
        });
        self.objects.write().await.insert(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paging_covers_every_key_once() {
        let store = MockObjectStore::new().with_page_size(3);
        store
            .insert_all((0..10).map(|i| format!("key-{:02}", i)))
            .await;

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store.list_page(None, token.as_deref()).await.unwrap();
            seen.extend(page.keys);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(seen.len(), 10);
        assert_eq!(store.list_calls().await, 4);
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let store = MockObjectStore::new();
        store.insert_all(["a/1", "a/2", "b/1"]).await;
        let page = store.list_page(Some("a/"), None).await.unwrap();
        assert_eq!(page.keys, vec!["a/1", "a/2"]);
    }
}
