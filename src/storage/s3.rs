//! S3-compatible Object Lock backend.

use async_trait::async_trait;
use aws_sdk_s3::{
    error::{ProvideErrorMetadata, SdkError},
    types::{
        DefaultRetention, ObjectLockEnabled, ObjectLockRetention, ObjectLockRetentionMode,
    },
};
use aws_smithy_types::DateTime as SmithyDateTime;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use super::{
    DefaultRetentionRule, ListPage, ObjectLockConfiguration, ObjectLockStore, ObjectRetention,
    RetentionMode, StorageError, StorageResult,
};
use crate::config::S3StorageConfig;

/// Error codes S3 returns when a bucket or object simply has no lock.
const LOCK_NOT_FOUND_CODE: &str = "ObjectLockConfigurationNotFoundError";
const RETENTION_NOT_FOUND_CODE: &str = "NoSuchObjectLockConfiguration";

/// Service error codes worth retrying on idempotent requests.
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "ServiceUnavailable",
    "SlowDown",
    "RequestTimeout",
    "RequestTimeTooSkewed",
    "Throttling",
    "ThrottlingException",
];

/// Object Lock backend over any S3-compatible service.
///
/// Supports:
/// - AWS S3
/// - MinIO
/// - Ceph RGW
/// - Any service implementing the Object Lock API
pub struct S3LockStore {
    client: aws_sdk_s3::Client,
}

impl S3LockStore {
    pub async fn new(config: &S3StorageConfig) -> StorageResult<Self> {
        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "Initializing S3 Object Lock client"
        );

        let credentials = aws_credential_types::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None, // session token
            None, // expiry
            "s3-retain-config",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&config.endpoint)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl ObjectLockStore for S3LockStore {
    #[instrument(skip(self))]
    async fn get_object_lock_configuration(
        &self,
        bucket: &str,
    ) -> StorageResult<ObjectLockConfiguration> {
        let output = self
            .client
            .get_object_lock_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                if service_code(&e) == Some(LOCK_NOT_FOUND_CODE) {
                    StorageError::LockNotConfigured(bucket.to_string())
                } else {
                    error!(error = %e, "Failed to get Object Lock configuration");
                    classify(e)
                }
            })?;

        let Some(configuration) = output.object_lock_configuration() else {
            return Err(StorageError::LockNotConfigured(bucket.to_string()));
        };

        let default_retention = configuration
            .rule()
            .and_then(|rule| rule.default_retention())
            .map(convert_default_retention)
            .transpose()?;

        Ok(ObjectLockConfiguration {
            enabled: configuration.object_lock_enabled() == Some(&ObjectLockEnabled::Enabled),
            default_retention,
        })
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list objects");
                classify(e)
            })?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let is_truncated = output.is_truncated().unwrap_or(false);

        debug!(keys = keys.len(), is_truncated, "Listed object page");

        Ok(ListPage {
            keys,
            is_truncated,
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn get_object_retention(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<ObjectRetention> {
        let output = self
            .client
            .get_object_retention()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let code = service_code(&e).map(str::to_owned);
                match code.as_deref() {
                    Some(RETENTION_NOT_FOUND_CODE) => {
                        StorageError::RetentionNotSet(key.to_string())
                    }
                    Some("NoSuchKey") => StorageError::NotFound(key.to_string()),
                    _ => {
                        error!(error = %e, "Failed to get object retention");
                        classify(e)
                    }
                }
            })?;

        let retention = output
            .retention()
            .ok_or_else(|| StorageError::RetentionNotSet(key.to_string()))?;
        let mode = retention
            .mode()
            .ok_or_else(|| StorageError::InvalidResponse(format!("no retention mode on '{key}'")))
            .and_then(convert_mode)?;
        let retain_until = retention
            .retain_until_date()
            .ok_or_else(|| {
                StorageError::InvalidResponse(format!("no retain-until date on '{key}'"))
            })
            .and_then(to_chrono)?;

        Ok(ObjectRetention { mode, retain_until })
    }

    #[instrument(skip(self, retention), fields(mode = %retention.mode, retain_until = %retention.retain_until))]
    async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        retention: &ObjectRetention,
    ) -> StorageResult<()> {
        let mode = match retention.mode {
            RetentionMode::Compliance => ObjectLockRetentionMode::Compliance,
            RetentionMode::Governance => ObjectLockRetentionMode::Governance,
        };
        let record = ObjectLockRetention::builder()
            .mode(mode)
            .retain_until_date(from_chrono(retention.retain_until))
            .build();

        self.client
            .put_object_retention()
            .bucket(bucket)
            .key(key)
            .retention(record)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to put object retention");
                classify(e)
            })?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}

/// Map an SDK error onto the storage error taxonomy.
fn classify<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = aws_sdk_s3::error::DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StorageError::Transient(message),
        SdkError::ServiceError(service) => {
            let transient_code = service
                .err()
                .code()
                .is_some_and(|code| TRANSIENT_CODES.contains(&code));
            if transient_code {
                StorageError::Transient(message)
            } else {
                StorageError::Service(message)
            }
        }
        _ => StorageError::Service(message),
    }
}

fn convert_mode(mode: &ObjectLockRetentionMode) -> StorageResult<RetentionMode> {
    match mode {
        ObjectLockRetentionMode::Compliance => Ok(RetentionMode::Compliance),
        ObjectLockRetentionMode::Governance => Ok(RetentionMode::Governance),
        other => other.as_str().parse(),
    }
}

fn convert_default_retention(retention: &DefaultRetention) -> StorageResult<DefaultRetentionRule> {
    let mode = retention
        .mode()
        .ok_or_else(|| StorageError::InvalidResponse("default retention without mode".into()))
        .and_then(convert_mode)?;

    Ok(DefaultRetentionRule {
        mode,
        days: retention.days(),
        years: retention.years(),
    })
}

fn to_chrono(value: &SmithyDateTime) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos()).ok_or_else(|| {
        StorageError::InvalidResponse(format!("retain-until date out of range: {value:?}"))
    })
}

fn from_chrono(value: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs_and_nanos(value.timestamp(), value.timestamp_subsec_nanos())
}
