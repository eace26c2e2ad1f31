//! Object storage connection configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! bucket = "archive"
//! endpoint = "http://localhost:9000"
//! access_key_id = "${S3_ACCESS_KEY}"
//! secret_access_key = "${S3_ACCESS_SECRET}"
//! ```

use serde::{Deserialize, Serialize};

/// Connection settings for the S3-compatible service holding the locked bucket.
///
/// Unlike most sections, the bucket, endpoint and credentials have no
/// defaults: a run against an unspecified target is a configuration error.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// Bucket with Object Lock enabled.
    pub bucket: String,

    /// Endpoint URL of the S3-compatible service.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - AWS: "https://s3.eu-central-1.amazonaws.com"
    pub endpoint: String,

    /// Access key ID.
    pub access_key_id: String,

    /// Secret access key.
    pub secret_access_key: String,

    /// Region name used for request signing.
    /// Default: "us-east-1"
    #[serde(default = "default_region")]
    pub region: String,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and most self-hosted services.
    /// Default: true
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &"****")
            .field("secret_access_key", &"****")
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3StorageConfig {
    /// Validate S3 configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.trim().is_empty() {
            return Err("S3 bucket name cannot be empty".to_string());
        }
        if self.endpoint.trim().is_empty() {
            return Err("S3 endpoint cannot be empty".to_string());
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err("S3 access key and secret must both be set".to_string());
        }
        if self.region.is_empty() {
            return Err("S3 region cannot be empty".to_string());
        }
        Ok(())
    }
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StorageConfig {
        toml::from_str(
            r#"
            bucket = "archive"
            endpoint = "http://localhost:9000"
            access_key_id = "minio"
            secret_access_key = "minio-secret"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.region, "us-east-1");
        assert!(config.force_path_style);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_endpoint_fails_to_parse() {
        let result: Result<S3StorageConfig, _> = toml::from_str(
            r#"
            bucket = "archive"
            access_key_id = "minio"
            secret_access_key = "minio-secret"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let config = S3StorageConfig {
            bucket: "  ".to_string(),
            ..config()
        };
        assert!(config.validate().unwrap_err().contains("bucket"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let debug = format!("{:?}", config());
        assert!(debug.contains("archive"));
        assert!(!debug.contains("minio-secret"));
        assert!(!debug.contains("\"minio\""));
    }
}
