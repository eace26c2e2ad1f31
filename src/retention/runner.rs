//! One complete renewal pass over a bucket, and its reporting.

use std::{pin::pin, time::Duration};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use thiserror::Error;
use tokio::time::Instant;

use super::{
    enumerator::object_keys,
    policy::{RenewalPolicy, RenewalWindow, resolve_default_retention},
    renewal::RenewalEngine,
};
use crate::{config::RetainConfig, error::RetainError, storage::ObjectLockStore};

/// Results from a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Objects renewed, or that would have been in a dry run.
    pub renewed: u64,
    /// Objects evaluated.
    pub total: u64,
    pub elapsed: Duration,
    pub dry_run: bool,
}

/// A run aborted by its first fatal error, with the counts reached before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: RetainError,
    pub renewed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

/// The bucket policy and the window a run would use, without enumerating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPlan {
    pub policy: RenewalPolicy,
    pub window: RenewalWindow,
}

#[derive(Debug, Default)]
struct Progress {
    renewed: u64,
    total: u64,
}

/// Resolve the bucket's default retention and compute the window for `now`.
pub async fn plan_renewal(
    store: &dyn ObjectLockStore,
    config: &RetainConfig,
    now: DateTime<Utc>,
) -> Result<RenewalPlan, RetainError> {
    let policy = resolve_default_retention(store, &config.storage.bucket, &config.retry).await?;
    let window = RenewalWindow::new(now, policy.period, config.renewal.factor)?;
    Ok(RenewalPlan { policy, window })
}

/// Run one renewal pass starting now.
pub async fn run_renewal(
    store: &dyn ObjectLockStore,
    config: &RetainConfig,
) -> Result<RunSummary, RunFailure> {
    run_renewal_at(store, config, Utc::now()).await
}

/// Run one renewal pass with every decision measured from `now`.
pub async fn run_renewal_at(
    store: &dyn ObjectLockStore,
    config: &RetainConfig,
    now: DateTime<Utc>,
) -> Result<RunSummary, RunFailure> {
    let started = Instant::now();
    let mut progress = Progress::default();

    match renew_all(store, config, now, &mut progress).await {
        Ok(()) => Ok(RunSummary {
            renewed: progress.renewed,
            total: progress.total,
            elapsed: started.elapsed(),
            dry_run: config.renewal.dry_run,
        }),
        Err(error) => Err(RunFailure {
            error,
            renewed: progress.renewed,
            total: progress.total,
            elapsed: started.elapsed(),
        }),
    }
}

async fn renew_all(
    store: &dyn ObjectLockStore,
    config: &RetainConfig,
    now: DateTime<Utc>,
    progress: &mut Progress,
) -> Result<(), RetainError> {
    let bucket = config.storage.bucket.as_str();
    let RenewalPlan { policy, window } = plan_renewal(store, config, now).await?;

    tracing::info!(
        bucket,
        threshold = %window.threshold,
        target = %window.target,
        factor = config.renewal.factor,
        dry_run = config.renewal.dry_run,
        "Starting retention renewal"
    );

    let engine = RenewalEngine::new(store, bucket, policy, window, &config.retry)
        .dry_run(config.renewal.dry_run);
    let mut keys = pin!(object_keys(
        store,
        bucket,
        config.renewal.page_size,
        &config.retry
    ));

    while let Some(key) = keys.try_next().await? {
        if engine.evaluate_and_renew(&key).await?.is_renewal() {
            progress.renewed += 1;
        }
        progress.total += 1;
    }

    Ok(())
}

/// Emit the single record describing how a run ended.
pub fn report(result: &Result<RunSummary, RunFailure>) {
    match result {
        Ok(summary) => {
            let dry_run_msg = if summary.dry_run { " (DRY RUN)" } else { "" };
            tracing::info!(
                renewed = summary.renewed,
                total = summary.total,
                elapsed_secs = summary.elapsed.as_secs_f64(),
                dry_run = summary.dry_run,
                "s3-retain finished successfully and updated {} out of {} objects in {:.1} seconds{}",
                summary.renewed,
                summary.total,
                summary.elapsed.as_secs_f64(),
                dry_run_msg
            );
        }
        Err(failure) => {
            tracing::error!(
                error_kind = failure.error.kind(),
                error = %failure.error,
                renewed = failure.renewed,
                total = failure.total,
                elapsed_secs = failure.elapsed.as_secs_f64(),
                "s3-retain failed with error: {}: {}",
                failure.error.kind(),
                failure.error
            );
        }
    }
}
