//! Bucket URL parsing.

use std::fmt;

use super::StorageError;

pub const GCS_SCHEME: &str = "gs://";
pub const S3_SCHEME: &str = "s3://";

/// A parsed bucket location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketUrl {
    /// `gs://{bucket}`
    Gcs { bucket: String },
    /// `s3://{region}/{bucket}`
    S3 { region: String, bucket: String },
}

impl BucketUrl {
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StorageError::EmptyUrl);
        }

        let malformed = |reason: &str| StorageError::MalformedUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = url.strip_prefix(GCS_SCHEME) {
            let bucket = rest.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(malformed("expected gs://<bucket>"));
            }
            Ok(Self::Gcs {
                bucket: bucket.to_string(),
            })
        } else if let Some(rest) = url.strip_prefix(S3_SCHEME) {
            let rest = rest.trim_end_matches('/');
            let Some((region, bucket)) = rest.split_once('/') else {
                return Err(malformed("expected s3://<region>/<bucket>"));
            };
            if region.is_empty() || bucket.is_empty() || bucket.contains('/') {
                return Err(malformed("expected s3://<region>/<bucket>"));
            }
            Ok(Self::S3 {
                region: region.to_string(),
                bucket: bucket.to_string(),
            })
        } else {
            Err(StorageError::UnrecognizedScheme(url.to_string()))
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            Self::Gcs { bucket } | Self::S3 { bucket, .. } => bucket,
        }
    }

    /// Whether this backend accepts an alternate identity.
    pub fn supports_identity(&self) -> bool {
        matches!(self, Self::S3 { .. })
    }

    /// Reject a non-empty identity for backends that only use ambient credentials.
    pub fn check_identity(&self, identity: Option<&str>) -> Result<(), StorageError> {
        match identity.filter(|i| !i.is_empty()) {
            Some(identity) if !self.supports_identity() => {
                Err(StorageError::IdentityNotSupported {
                    url: self.to_string(),
                    identity: identity.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BucketUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs { bucket } => write!(f, "{}{}", GCS_SCHEME, bucket),
            Self::S3 { region, bucket } => write!(f, "{}{}/{}", S3_SCHEME, region, bucket),
        }
    }
}
