//! Per-object renewal decision, write and read-back verification.

use tracing::{debug, info};

use super::policy::{RenewalPolicy, RenewalWindow};
use crate::{
    config::RetryConfig,
    error::RetainError,
    retry::with_retry,
    storage::{ObjectLockStore, ObjectRetention, StorageError},
};

/// What happened to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The lock was extended and the new value read back unchanged.
    Renewed,
    /// The lock is due but the run is a dry run.
    WouldRenew,
    /// The lock ends at or after the threshold.
    Skipped,
}

impl RenewalOutcome {
    /// Whether the object counts towards the renewed total.
    pub fn is_renewal(&self) -> bool {
        matches!(self, RenewalOutcome::Renewed | RenewalOutcome::WouldRenew)
    }
}

/// Evaluates and renews objects of one bucket against one renewal window.
pub struct RenewalEngine<'a> {
    store: &'a dyn ObjectLockStore,
    bucket: &'a str,
    policy: RenewalPolicy,
    window: RenewalWindow,
    retry: &'a RetryConfig,
    dry_run: bool,
}

impl<'a> RenewalEngine<'a> {
    pub fn new(
        store: &'a dyn ObjectLockStore,
        bucket: &'a str,
        policy: RenewalPolicy,
        window: RenewalWindow,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            store,
            bucket,
            policy,
            window,
            retry,
            dry_run: false,
        }
    }

    /// Log due renewals instead of writing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The retention record written on renewal.
    pub fn target(&self) -> ObjectRetention {
        ObjectRetention {
            mode: self.policy.mode,
            retain_until: self.window.target,
        }
    }

    /// Read the lock of `key` and extend it if it ends before the threshold.
    ///
    /// A renewal is confirmed by reading the lock back. Anything other than
    /// an exact match with the written record is a
    /// [`RetainError::RenewalVerification`]. The write itself is sent once.
    pub async fn evaluate_and_renew(&self, key: &str) -> Result<RenewalOutcome, RetainError> {
        let current = self.read_retention(key).await?;

        if !self.window.is_expiring(current.retain_until) {
            debug!(
                key,
                retain_until = %current.retain_until,
                threshold = %self.window.threshold,
                "Retention not due, skipping"
            );
            return Ok(RenewalOutcome::Skipped);
        }

        if current.mode != self.policy.mode {
            return Err(RetainError::ModeMismatch {
                key: key.to_string(),
                current: current.mode,
                default: self.policy.mode,
            });
        }

        let target = self.target();

        if self.dry_run {
            info!(
                key,
                retain_until = %current.retain_until,
                target = %target.retain_until,
                "DRY RUN: Would renew retention"
            );
            return Ok(RenewalOutcome::WouldRenew);
        }

        self.store
            .put_object_retention(self.bucket, key, &target)
            .await
            .map_err(|e| RetainError::storage("put_object_retention", key, e))?;

        let actual = self.read_retention(key).await?;
        if actual != target {
            return Err(RetainError::RenewalVerification {
                key: key.to_string(),
                expected: target,
                actual,
            });
        }

        info!(
            key,
            mode = %target.mode,
            previous = %current.retain_until,
            retain_until = %target.retain_until,
            "Renewed retention"
        );
        Ok(RenewalOutcome::Renewed)
    }

    async fn read_retention(&self, key: &str) -> Result<ObjectRetention, RetainError> {
        with_retry(
            self.retry,
            "get_object_retention",
            StorageError::is_transient,
            || self.store.get_object_retention(self.bucket, key),
        )
        .await
        .map_err(|e| RetainError::storage("get_object_retention", key, e))
    }
}
