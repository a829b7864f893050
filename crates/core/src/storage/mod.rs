//! Object storage for batch files and task markers.
//!
//! A [`Bucket`] wraps one [`ObjectStore`]. Production buckets resolve to a
//! [`StorageBackend`] from their URL, tests plug in a mock store.

mod backend;
mod bucket;
mod error;
pub mod gcs;
pub mod s3;
mod traits;
mod url;

pub use backend::StorageBackend;
pub use bucket::Bucket;
pub use error::StorageError;
pub use gcs::GcsStore;
pub use s3::S3Store;
pub use traits::{ListPage, ObjectStore};
pub use url::BucketUrl;
