//! Lazy walk over every key in a bucket.

use futures::{Stream, TryStreamExt, stream};
use tracing::debug;

use crate::{
    config::RetryConfig,
    error::RetainError,
    retry::with_retry,
    storage::{ObjectLockStore, StorageError},
};

enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Stream every key of `bucket` in listing order.
///
/// Pages are fetched on demand, so a consumer that stops early never lists
/// the rest of the bucket. The stream ends after the first page that is not
/// truncated, and yields a single [`RetainError::Enumeration`] if a listing
/// call fails.
pub fn object_keys<'a>(
    store: &'a dyn ObjectLockStore,
    bucket: &'a str,
    page_size: i32,
    retry: &'a RetryConfig,
) -> impl Stream<Item = Result<String, RetainError>> + 'a {
    stream::try_unfold(PageCursor::Start, move |cursor| async move {
        let token = match cursor {
            PageCursor::Done => return Ok(None),
            PageCursor::Start => None,
            PageCursor::Next(token) => Some(token),
        };

        let page = with_retry(retry, "list_objects", StorageError::is_transient, || {
            store.list_objects(bucket, page_size, token.as_deref())
        })
        .await
        .map_err(|source| RetainError::Enumeration {
            bucket: bucket.to_string(),
            source,
        })?;

        debug!(
            bucket,
            keys = page.keys.len(),
            is_truncated = page.is_truncated,
            "Fetched listing page"
        );

        let next = match (page.is_truncated, page.next_continuation_token) {
            (false, _) => PageCursor::Done,
            (true, Some(token)) => PageCursor::Next(token),
            (true, None) => {
                return Err(RetainError::Enumeration {
                    bucket: bucket.to_string(),
                    source: StorageError::InvalidResponse(
                        "truncated listing page without a continuation token".into(),
                    ),
                });
            }
        };

        Ok(Some((stream::iter(page.keys.into_iter().map(Ok)), next)))
    })
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::DateTime;
    use futures::StreamExt;

    use super::*;
    use crate::storage::{
        InMemoryLockStore, ListPage, ObjectLockConfiguration, ObjectRetention, RetentionMode,
        StorageResult,
    };

    fn retention() -> ObjectRetention {
        ObjectRetention {
            mode: RetentionMode::Governance,
            retain_until: DateTime::from_timestamp(1_800_000_000, 0).unwrap(),
        }
    }

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("backup/{i:05}.tar")).collect()
    }

    #[tokio::test]
    async fn test_walks_all_pages_in_order() {
        let expected = keys(2500);
        let store = InMemoryLockStore::new().objects(expected.clone(), retention());
        let retry = RetryConfig::disabled();

        let listed: Vec<String> = object_keys(&store, "archive", 1000, &retry)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(listed, expected);
        assert_eq!(listed.iter().collect::<HashSet<_>>().len(), 2500);
        assert_eq!(store.calls().await.list, 3);
    }

    #[tokio::test]
    async fn test_empty_bucket() {
        let store = InMemoryLockStore::new();
        let retry = RetryConfig::disabled();

        let listed: Vec<String> = object_keys(&store, "archive", 1000, &retry)
            .try_collect()
            .await
            .unwrap();

        assert!(listed.is_empty());
        assert_eq!(store.calls().await.list, 1);
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let store = InMemoryLockStore::new().objects(keys(30), retention());
        let retry = RetryConfig::disabled();

        let first: Vec<_> = object_keys(&store, "archive", 10, &retry)
            .take(5)
            .collect()
            .await;

        assert_eq!(first.len(), 5);
        assert_eq!(store.calls().await.list, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_ends_stream_with_error() {
        let store = InMemoryLockStore::new()
            .objects(keys(25), retention())
            .fail_list_on_page(1);
        let retry = RetryConfig::disabled();

        let items: Vec<_> = object_keys(&store, "archive", 10, &retry).collect().await;

        assert_eq!(items.len(), 11);
        assert!(items[..10].iter().all(Result::is_ok));
        assert!(matches!(
            items[10],
            Err(RetainError::Enumeration { ref bucket, .. }) if bucket == "archive"
        ));
    }

    /// Reports truncation but never hands out a token.
    struct TokenlessStore;

    #[async_trait]
    impl ObjectLockStore for TokenlessStore {
        async fn get_object_lock_configuration(
            &self,
            bucket: &str,
        ) -> StorageResult<ObjectLockConfiguration> {
            Err(StorageError::LockNotConfigured(bucket.to_string()))
        }

        async fn list_objects(
            &self,
            _bucket: &str,
            _max_keys: i32,
            _continuation_token: Option<&str>,
        ) -> StorageResult<ListPage> {
            Ok(ListPage {
                keys: vec!["a".into()],
                is_truncated: true,
                next_continuation_token: None,
            })
        }

        async fn get_object_retention(
            &self,
            _bucket: &str,
            key: &str,
        ) -> StorageResult<ObjectRetention> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn put_object_retention(
            &self,
            _bucket: &str,
            key: &str,
            _retention: &ObjectRetention,
        ) -> StorageResult<()> {
            Err(StorageError::NotFound(key.to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "tokenless"
        }
    }

    #[tokio::test]
    async fn test_truncated_page_without_token_is_an_error() {
        let retry = RetryConfig::disabled();
        let result: Result<Vec<String>, _> = object_keys(&TokenlessStore, "archive", 1000, &retry)
            .try_collect()
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), "EnumerationError");
        assert!(err.to_string().contains("continuation token"));
    }
}
