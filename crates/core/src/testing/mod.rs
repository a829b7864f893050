//! Testing utilities and mock backends.
//!
//! The mocks implement the storage and queue traits in memory so whole
//! scheduling passes can run without cloud infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use workflow_manager_core::storage::Bucket;
//! use workflow_manager_core::testing::{fixtures, MockObjectStore, MockPublisher};
//!
//! let ingestion = MockObjectStore::named("gs://ingestion");
//! ingestion.insert_all(fixtures::batch_keys("kittens-seen", time, "b1", "batch")).await;
//!
//! let publisher = MockPublisher::detached();
//! publisher.fail_when_contains("b2", "quota exceeded").await;
//! ```

mod mock_object_store;
mod mock_publisher;

pub use mock_object_store::{MockObjectStore, RecordedPut};
pub use mock_publisher::MockPublisher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    /// Base key of a batch.
    pub fn batch_path(aggregation_id: &str, time: DateTime<Utc>, batch_id: &str) -> String {
        format!(
            "{}/{}/{}",
            aggregation_id,
            time.format("%Y/%m/%d/%H/%M"),
            batch_id
        )
    }

    /// The header, payload and signature keys of a complete batch.
    pub fn batch_keys(
        aggregation_id: &str,
        time: DateTime<Utc>,
        batch_id: &str,
        infix: &str,
    ) -> Vec<String> {
        let base = batch_path(aggregation_id, time, batch_id);
        vec![
            format!("{}.{}", base, infix),
            format!("{}.{}.avro", base, infix),
            format!("{}.{}.sig", base, infix),
        ]
    }

    /// Like [`batch_keys`] but without the signature, so the batch never
    /// becomes ready.
    pub fn incomplete_batch_keys(
        aggregation_id: &str,
        time: DateTime<Utc>,
        batch_id: &str,
        infix: &str,
    ) -> Vec<String> {
        let mut keys = batch_keys(aggregation_id, time, batch_id, infix);
        keys.pop();
        keys
    }
}
