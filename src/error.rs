//! Run-level error type.
//!
//! Every variant is fatal: the first error aborts the run and becomes its
//! single reported outcome.

use thiserror::Error;

use crate::{
    config::ConfigError,
    storage::{ObjectRetention, RetentionMode, StorageError},
};

#[derive(Debug, Error)]
pub enum RetainError {
    /// Missing or invalid configuration, or a bucket without a usable
    /// default retention rule. No objects are processed.
    #[error("{0}")]
    Configuration(String),

    /// A listing call failed mid-run.
    #[error("listing bucket '{bucket}' failed: {source}")]
    Enumeration {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// The retention read back after a write differs from what was written.
    #[error("setting updated retention failed for key '{key}': wrote {expected}, read back {actual}")]
    RenewalVerification {
        key: String,
        expected: ObjectRetention,
        actual: ObjectRetention,
    },

    /// Renewing would move an object to a different retention mode.
    #[error("key '{key}' is locked in {current} mode but the bucket default is {default}")]
    ModeMismatch {
        key: String,
        current: RetentionMode,
        default: RetentionMode,
    },

    /// Any other storage call failure.
    #[error("{operation} failed for '{target}': {source}")]
    Storage {
        operation: &'static str,
        target: String,
        #[source]
        source: StorageError,
    },
}

impl RetainError {
    pub fn storage(
        operation: &'static str,
        target: impl Into<String>,
        source: StorageError,
    ) -> Self {
        RetainError::Storage {
            operation,
            target: target.into(),
            source,
        }
    }

    /// Stable name of the error kind, used in the failure record.
    pub fn kind(&self) -> &'static str {
        match self {
            RetainError::Configuration(_) => "ConfigurationError",
            RetainError::Enumeration { .. } => "EnumerationError",
            RetainError::RenewalVerification { .. } => "RenewalVerificationError",
            RetainError::ModeMismatch { .. } => "ModeMismatchError",
            RetainError::Storage { source, .. } if source.is_transient() => {
                "TransientStorageError"
            }
            RetainError::Storage { .. } => "StorageError",
        }
    }
}

impl From<ConfigError> for RetainError {
    fn from(err: ConfigError) -> Self {
        RetainError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RetainError::Configuration("x".into()).kind(),
            "ConfigurationError"
        );
        assert_eq!(
            RetainError::storage(
                "get_object_retention",
                "a",
                StorageError::Transient("timeout".into())
            )
            .kind(),
            "TransientStorageError"
        );
        assert_eq!(
            RetainError::storage(
                "get_object_retention",
                "a",
                StorageError::Service("AccessDenied".into())
            )
            .kind(),
            "StorageError"
        );
    }

    #[test]
    fn test_verification_message_names_key() {
        let expected = ObjectRetention {
            mode: RetentionMode::Governance,
            retain_until: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
        };
        let actual = ObjectRetention {
            retain_until: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            ..expected
        };
        let err = RetainError::RenewalVerification {
            key: "logs/2026/01.tar".into(),
            expected,
            actual,
        };

        let message = err.to_string();
        assert!(message.contains("logs/2026/01.tar"));
        assert!(message.contains("2027-01-01"));
        assert!(message.contains("2026-06-01"));
        assert_eq!(err.kind(), "RenewalVerificationError");
    }

    #[test]
    fn test_mode_mismatch_names_both_modes() {
        let err = RetainError::ModeMismatch {
            key: "ledger/2026-q3.parquet".into(),
            current: RetentionMode::Compliance,
            default: RetentionMode::Governance,
        };

        let message = err.to_string();
        assert!(message.contains("ledger/2026-q3.parquet"));
        assert!(message.contains("COMPLIANCE"));
        assert!(message.contains("GOVERNANCE"));
        assert_eq!(err.kind(), "ModeMismatchError");
    }

    #[test]
    fn test_config_error_converts() {
        let err: RetainError = ConfigError::EnvVarNotFound("S3_BUCKET".into()).into();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(err.to_string().contains("S3_BUCKET"));
    }
}
