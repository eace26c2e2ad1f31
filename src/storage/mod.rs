//! Object Lock storage backends.
//!
//! This module provides a trait-based abstraction over the four S3 calls a
//! renewal run needs, allowing the renewal logic to run against:
//!
//! - **S3**: any S3-compatible service with Object Lock (AWS, MinIO, Ceph RGW)
//! - **Memory**: a deterministic in-process bucket with fault injection, used
//!   to exercise verification and pagination edge cases
//!
//! The S3 backend requires the `s3-storage` feature. The memory backend is
//! only built for tests, or for downstream tests with the `test-utils` feature.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "s3-storage")]
mod s3;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryLockStore;
#[cfg(feature = "s3-storage")]
pub use s3::S3LockStore;
use thiserror::Error;

/// Object Lock retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionMode {
    /// Cannot be shortened or removed by any principal, including root.
    Compliance,
    /// Can be overridden by principals holding `s3:BypassGovernanceRetention`.
    Governance,
}

impl RetentionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionMode::Compliance => "COMPLIANCE",
            RetentionMode::Governance => "GOVERNANCE",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COMPLIANCE" => Ok(RetentionMode::Compliance),
            "GOVERNANCE" => Ok(RetentionMode::Governance),
            other => Err(StorageError::InvalidResponse(format!(
                "unknown retention mode '{other}'"
            ))),
        }
    }
}

/// The retention record attached to a single object version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRetention {
    pub mode: RetentionMode,
    pub retain_until: DateTime<Utc>,
}

impl fmt::Display for ObjectRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} until {}", self.mode, self.retain_until.to_rfc3339())
    }
}

/// Bucket-level default retention rule.
///
/// S3 allows exactly one of `days` or `years`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRetentionRule {
    pub mode: RetentionMode,
    pub days: Option<i32>,
    pub years: Option<i32>,
}

/// A bucket's Object Lock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLockConfiguration {
    /// Whether Object Lock is enabled on the bucket.
    pub enabled: bool,
    /// The default retention rule, if one is configured.
    pub default_retention: Option<DefaultRetentionRule>,
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object Lock is not configured on bucket '{0}'")]
    LockNotConfigured(String),

    #[error("No retention set on object '{0}'")]
    RetentionNotSet(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeouts, dispatch failures, throttling and 5xx responses.
    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("S3 error: {0}")]
    Service(String),

    #[error("Unexpected storage response: {0}")]
    InvalidResponse(String),
}

impl StorageError {
    /// Whether repeating the same idempotent request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The storage operations a renewal run consumes.
///
/// Implementations must be `Send + Sync` to support async contexts.
#[async_trait]
pub trait ObjectLockStore: Send + Sync {
    /// Fetch the bucket's Object Lock configuration.
    ///
    /// Returns [`StorageError::LockNotConfigured`] when the bucket has none.
    async fn get_object_lock_configuration(
        &self,
        bucket: &str,
    ) -> StorageResult<ObjectLockConfiguration>;

    /// List one page of object keys, starting after `continuation_token`.
    async fn list_objects(
        &self,
        bucket: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage>;

    /// Read the retention record of an object.
    async fn get_object_retention(&self, bucket: &str, key: &str)
    -> StorageResult<ObjectRetention>;

    /// Replace the retention record of an object.
    async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        retention: &ObjectRetention,
    ) -> StorageResult<()>;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}
