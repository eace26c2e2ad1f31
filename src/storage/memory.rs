//! In-process Object Lock bucket.
//!
//! Keys are kept in lexicographic order like S3 returns them. Continuation
//! tokens are the last key of the previous page, which callers treat as
//! opaque. Faults can be injected to simulate backend misbehavior:
//!
//! - a listing call that fails on a given page
//! - a read-back that disagrees with the value just written
//! - writes that are acknowledged but never applied
//! - reads that fail transiently a fixed number of times

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::Mutex;

use super::{
    DefaultRetentionRule, ListPage, ObjectLockConfiguration, ObjectLockStore, ObjectRetention,
    RetentionMode, StorageError, StorageResult,
};

#[derive(Debug, Default)]
struct Faults {
    /// Zero-based index of the listing call that fails.
    fail_list_on_page: Option<usize>,
    /// Keys whose retention reads are skewed by this amount after a write.
    read_back_drift: BTreeMap<String, TimeDelta>,
    /// Acknowledge writes without applying them.
    ignore_writes: bool,
    /// Number of upcoming read calls that fail with a transient error.
    transient_read_failures: usize,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub lock_configuration: usize,
    pub list: usize,
    pub get_retention: usize,
    pub put_retention: usize,
}

#[derive(Debug, Default)]
struct State {
    lock_configuration: Option<ObjectLockConfiguration>,
    objects: BTreeMap<String, ObjectRetention>,
    written: Vec<String>,
    drifted: BTreeMap<String, TimeDelta>,
    faults: Faults,
    calls: CallCounts,
}

impl State {
    fn take_transient_failure(&mut self, operation: &str) -> StorageResult<()> {
        if self.faults.transient_read_failures > 0 {
            self.faults.transient_read_failures -= 1;
            return Err(StorageError::Transient(format!(
                "{operation}: simulated connection reset"
            )));
        }
        Ok(())
    }
}

/// A single in-memory bucket.
///
/// The bucket name passed to each call is not checked; one store models one
/// bucket.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    state: Mutex<State>,
}

impl InMemoryLockStore {
    /// A bucket without any Object Lock configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bucket with Object Lock enabled and a default retention of `days`.
    pub fn with_default_days(mode: RetentionMode, days: i32) -> Self {
        Self::new().lock_configuration(ObjectLockConfiguration {
            enabled: true,
            default_retention: Some(DefaultRetentionRule {
                mode,
                days: Some(days),
                years: None,
            }),
        })
    }

    /// A bucket with Object Lock enabled and a default retention of `years`.
    pub fn with_default_years(mode: RetentionMode, years: i32) -> Self {
        Self::new().lock_configuration(ObjectLockConfiguration {
            enabled: true,
            default_retention: Some(DefaultRetentionRule {
                mode,
                days: None,
                years: Some(years),
            }),
        })
    }

    pub fn lock_configuration(mut self, configuration: ObjectLockConfiguration) -> Self {
        self.state.get_mut().lock_configuration = Some(configuration);
        self
    }

    /// Add an object with the given retention record.
    pub fn object(mut self, key: impl Into<String>, retention: ObjectRetention) -> Self {
        self.state.get_mut().objects.insert(key.into(), retention);
        self
    }

    /// Add many objects sharing one retention record.
    pub fn objects<I, K>(mut self, keys: I, retention: ObjectRetention) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let state = self.state.get_mut();
        for key in keys {
            state.objects.insert(key.into(), retention);
        }
        self
    }

    /// Make the `page`-th listing call (zero-based) fail.
    pub fn fail_list_on_page(mut self, page: usize) -> Self {
        self.state.get_mut().faults.fail_list_on_page = Some(page);
        self
    }

    /// After `key` is written, report its lock as ending `drift` later than stored.
    pub fn drift_read_back(mut self, key: impl Into<String>, drift: TimeDelta) -> Self {
        self.state
            .get_mut()
            .faults
            .read_back_drift
            .insert(key.into(), drift);
        self
    }

    /// Acknowledge retention writes without applying them.
    pub fn ignore_writes(mut self) -> Self {
        self.state.get_mut().faults.ignore_writes = true;
        self
    }

    /// Fail the next `count` read calls with a transient error.
    pub fn fail_reads_transiently(mut self, count: usize) -> Self {
        self.state.get_mut().faults.transient_read_failures = count;
        self
    }

    /// The stored retention record of `key`.
    pub async fn retention(&self, key: &str) -> Option<ObjectRetention> {
        self.state.lock().await.objects.get(key).copied()
    }

    /// Keys whose retention was written, in write order.
    pub async fn written_keys(&self) -> Vec<String> {
        self.state.lock().await.written.clone()
    }

    pub async fn calls(&self) -> CallCounts {
        self.state.lock().await.calls
    }
}

#[async_trait]
impl ObjectLockStore for InMemoryLockStore {
    async fn get_object_lock_configuration(
        &self,
        bucket: &str,
    ) -> StorageResult<ObjectLockConfiguration> {
        let mut state = self.state.lock().await;
        state.calls.lock_configuration += 1;
        state.take_transient_failure("get_object_lock_configuration")?;
        state
            .lock_configuration
            .ok_or_else(|| StorageError::LockNotConfigured(bucket.to_string()))
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        let mut state = self.state.lock().await;
        let page = state.calls.list;
        state.calls.list += 1;
        state.take_transient_failure("list_objects")?;

        if state.faults.fail_list_on_page == Some(page) {
            return Err(StorageError::Service(format!(
                "simulated listing failure on page {page}"
            )));
        }

        let max_keys = usize::try_from(max_keys.max(1)).unwrap_or(1);
        let mut remaining = state.objects.keys().filter(|key| match continuation_token {
            Some(after) => key.as_str() > after,
            None => true,
        });

        let keys: Vec<String> = remaining.by_ref().take(max_keys).cloned().collect();
        let is_truncated = remaining.next().is_some();
        let next_continuation_token = if is_truncated {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage {
            keys,
            is_truncated,
            next_continuation_token,
        })
    }

    async fn get_object_retention(
        &self,
        _bucket: &str,
        key: &str,
    ) -> StorageResult<ObjectRetention> {
        let mut state = self.state.lock().await;
        state.calls.get_retention += 1;
        state.take_transient_failure("get_object_retention")?;

        let mut retention = state
            .objects
            .get(key)
            .copied()
            .ok_or_else(|| StorageError::RetentionNotSet(key.to_string()))?;
        if let Some(drift) = state.drifted.get(key) {
            retention.retain_until += *drift;
        }
        Ok(retention)
    }

    async fn put_object_retention(
        &self,
        _bucket: &str,
        key: &str,
        retention: &ObjectRetention,
    ) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        state.calls.put_retention += 1;

        let Some(current) = state.objects.get(key).copied() else {
            return Err(StorageError::NotFound(key.to_string()));
        };

        // S3 rejects shortening a lock without a governance bypass.
        if retention.retain_until < current.retain_until {
            return Err(StorageError::Service(format!(
                "AccessDenied: retention of '{key}' cannot be shortened"
            )));
        }
        if current.mode == RetentionMode::Compliance && retention.mode != current.mode {
            return Err(StorageError::Service(format!(
                "AccessDenied: compliance mode of '{key}' cannot be changed"
            )));
        }

        state.written.push(key.to_string());
        if let Some(drift) = state.faults.read_back_drift.get(key).copied() {
            state.drifted.insert(key.to_string(), drift);
        }
        if !state.faults.ignore_writes {
            state.objects.insert(key.to_string(), *retention);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
