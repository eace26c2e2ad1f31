//! Bucket default retention and the per-run renewal window.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{debug, info};

use crate::{
    config::RetryConfig,
    error::RetainError,
    retry::with_retry,
    storage::{DefaultRetentionRule, ObjectLockStore, RetentionMode, StorageError},
};

/// Days counted per year of a year-based default retention rule.
pub const DAYS_PER_YEAR: i64 = 365;

/// The bucket's default retention, used as the template for every renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub mode: RetentionMode,
    pub period: TimeDelta,
}

impl RenewalPolicy {
    /// Convert a default retention rule. Years take precedence over days.
    pub fn from_rule(rule: &DefaultRetentionRule) -> Result<Self, RetainError> {
        let days = match (rule.years, rule.days) {
            (Some(years), _) => i64::from(years) * DAYS_PER_YEAR,
            (None, Some(days)) => i64::from(days),
            (None, None) => {
                return Err(RetainError::Configuration(
                    "default retention rule specifies neither days nor years".into(),
                ));
            }
        };
        if days <= 0 {
            return Err(RetainError::Configuration(format!(
                "default retention period must be positive, got {days} days"
            )));
        }

        let period = TimeDelta::try_days(days).ok_or_else(|| {
            RetainError::Configuration(format!("default retention of {days} days is out of range"))
        })?;

        Ok(Self {
            mode: rule.mode,
            period,
        })
    }
}

/// Fetch the bucket's Object Lock configuration and extract its default
/// retention rule.
pub async fn resolve_default_retention(
    store: &dyn ObjectLockStore,
    bucket: &str,
    retry: &RetryConfig,
) -> Result<RenewalPolicy, RetainError> {
    let configuration = with_retry(
        retry,
        "get_object_lock_configuration",
        StorageError::is_transient,
        || store.get_object_lock_configuration(bucket),
    )
    .await
    .map_err(|e| match e {
        StorageError::LockNotConfigured(_) => {
            RetainError::Configuration(format!("bucket '{bucket}' has no Object Lock configuration"))
        }
        other => RetainError::storage("get_object_lock_configuration", bucket, other),
    })?;

    if !configuration.enabled {
        return Err(RetainError::Configuration(format!(
            "Object Lock is not enabled on bucket '{bucket}'"
        )));
    }
    let Some(rule) = configuration.default_retention else {
        return Err(RetainError::Configuration(format!(
            "bucket '{bucket}' has no default retention rule"
        )));
    };

    let policy = RenewalPolicy::from_rule(&rule)?;
    info!(
        bucket,
        backend = store.backend_name(),
        mode = %policy.mode,
        period_days = policy.period.num_days(),
        "Resolved default retention"
    );
    Ok(policy)
}

/// Timestamps shared by every decision of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalWindow {
    /// Start of the run, truncated to whole seconds.
    pub now: DateTime<Utc>,
    /// Locks ending before this instant are renewed.
    pub threshold: DateTime<Utc>,
    /// The retain-until date written on renewal.
    pub target: DateTime<Utc>,
}

impl RenewalWindow {
    /// Compute `now + factor * period` and `now + period`.
    ///
    /// `now` is truncated to whole seconds because S3 stores retain-until
    /// dates at second precision, and the read-back after a write must match
    /// the target exactly.
    pub fn new(now: DateTime<Utc>, period: TimeDelta, factor: f64) -> Result<Self, RetainError> {
        let now = now.trunc_subsecs(0);
        let lead_ms = (period.num_milliseconds() as f64 * factor).round() as i64;
        let lead = TimeDelta::try_milliseconds(lead_ms).ok_or_else(|| {
            RetainError::Configuration(format!("renewal threshold of {lead_ms}ms is out of range"))
        })?;

        let threshold = now.checked_add_signed(lead);
        let target = now.checked_add_signed(period);
        let (Some(threshold), Some(target)) = (threshold, target) else {
            return Err(RetainError::Configuration(format!(
                "retention period of {} days overflows the calendar",
                period.num_days()
            )));
        };

        debug!(%now, %threshold, %target, factor, "Computed renewal window");
        Ok(Self {
            now,
            threshold,
            target,
        })
    }

    /// Whether a lock ending at `retain_until` is due for renewal.
    pub fn is_expiring(&self, retain_until: DateTime<Utc>) -> bool {
        retain_until < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::storage::{InMemoryLockStore, ObjectLockConfiguration};

    fn rule(days: Option<i32>, years: Option<i32>) -> DefaultRetentionRule {
        DefaultRetentionRule {
            mode: RetentionMode::Governance,
            days,
            years,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    #[rstest]
    #[case::days(Some(30), None, 30)]
    #[case::years(None, Some(2), 730)]
    #[case::years_win(Some(10), Some(1), 365)]
    fn test_policy_period(
        #[case] days: Option<i32>,
        #[case] years: Option<i32>,
        #[case] expected_days: i64,
    ) {
        let policy = RenewalPolicy::from_rule(&rule(days, years)).unwrap();
        assert_eq!(policy.period, TimeDelta::days(expected_days));
        assert_eq!(policy.mode, RetentionMode::Governance);
    }

    #[rstest]
    #[case::empty(None, None)]
    #[case::zero_days(Some(0), None)]
    #[case::negative_years(None, Some(-1))]
    fn test_policy_rejects_unusable_rule(#[case] days: Option<i32>, #[case] years: Option<i32>) {
        let err = RenewalPolicy::from_rule(&rule(days, years)).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn test_window_half_factor() {
        let window = RenewalWindow::new(now(), TimeDelta::days(365), 0.5).unwrap();
        assert_eq!(window.now, now());
        assert_eq!(window.threshold, now() + TimeDelta::hours(365 * 12));
        assert_eq!(window.target, now() + TimeDelta::days(365));
    }

    #[rstest]
    #[case::zero(0.0, TimeDelta::zero())]
    #[case::full(1.0, TimeDelta::days(10))]
    #[case::tenth(0.1, TimeDelta::days(1))]
    fn test_window_factor_bounds(#[case] factor: f64, #[case] lead: TimeDelta) {
        let window = RenewalWindow::new(now(), TimeDelta::days(10), factor).unwrap();
        assert_eq!(window.threshold, now() + lead);
    }

    #[test]
    fn test_window_truncates_subseconds() {
        let with_nanos = now() + TimeDelta::milliseconds(750);
        let window = RenewalWindow::new(with_nanos, TimeDelta::days(1), 0.5).unwrap();
        assert_eq!(window.now, now());
        assert_eq!(window.target, now() + TimeDelta::days(1));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let window = RenewalWindow::new(now(), TimeDelta::days(10), 0.5).unwrap();
        assert!(window.is_expiring(window.threshold - TimeDelta::seconds(1)));
        assert!(!window.is_expiring(window.threshold));
        assert!(!window.is_expiring(window.threshold + TimeDelta::seconds(1)));
    }

    #[tokio::test]
    async fn test_resolve_days_rule() {
        let store = InMemoryLockStore::with_default_days(RetentionMode::Compliance, 90);
        let policy = resolve_default_retention(&store, "archive", &RetryConfig::disabled())
            .await
            .unwrap();
        assert_eq!(policy.mode, RetentionMode::Compliance);
        assert_eq!(policy.period, TimeDelta::days(90));
    }

    #[tokio::test]
    async fn test_resolve_years_rule() {
        let store = InMemoryLockStore::with_default_years(RetentionMode::Governance, 1);
        let policy = resolve_default_retention(&store, "archive", &RetryConfig::disabled())
            .await
            .unwrap();
        assert_eq!(policy.period, TimeDelta::days(365));
    }

    #[tokio::test]
    async fn test_resolve_without_lock_configuration() {
        let store = InMemoryLockStore::new();
        let err = resolve_default_retention(&store, "archive", &RetryConfig::disabled())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(err.to_string().contains("archive"));
    }

    #[tokio::test]
    async fn test_resolve_without_default_rule() {
        let store = InMemoryLockStore::new().lock_configuration(ObjectLockConfiguration {
            enabled: true,
            default_retention: None,
        });
        let err = resolve_default_retention(&store, "archive", &RetryConfig::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, RetainError::Configuration(m) if m.contains("default retention")));
    }

    #[tokio::test]
    async fn test_resolve_retries_transient_failure() {
        let store = InMemoryLockStore::with_default_days(RetentionMode::Governance, 30)
            .fail_reads_transiently(2);
        let retry = RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            jitter: 0.0,
            ..Default::default()
        };

        let policy = resolve_default_retention(&store, "archive", &retry)
            .await
            .unwrap();
        assert_eq!(policy.period, TimeDelta::days(30));
        assert_eq!(store.calls().await.lock_configuration, 3);
    }
}
