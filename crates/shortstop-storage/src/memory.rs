use async_trait::async_trait;
use parking_lot::RwLock;
use shortstop_core::{
    CorrelationLongPair, CorrelationShortPair, Repository, Result, ShortCode, StorageError,
    UrlPair,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Default)]
struct Inner {
    urls: HashMap<ShortCode, String>,
    user_shorts: HashMap<String, HashSet<ShortCode>>,
}

/// In-memory implementation of the repository contract.
///
/// One reader-writer lock guards both maps: the code → long URL table and
/// the per-user ownership index mutate together, and lookups vastly
/// outnumber writes in this workload, so readers share the lock while
/// writers take it exclusively.
///
/// Code collisions are last-writer-wins here; conflict detection is a
/// [`PostgresStore`] feature.
///
/// [`PostgresStore`]: crate::postgres::PostgresStore
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping whose code is already known, bypassing code
    /// generation. Used by the durable log store when replaying records.
    pub fn set_long_url(&self, short: ShortCode, long: String, user_id: &str) {
        let mut inner = self.inner.write();
        inner
            .user_shorts
            .entry(user_id.to_owned())
            .or_default()
            .insert(short.clone());
        inner.urls.insert(short, long);
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn save_long_url(&self, long: &str, user_id: &str) -> Result<ShortCode> {
        let short = ShortCode::from_long_url(long);
        self.set_long_url(short.clone(), long.to_owned(), user_id);
        Ok(short)
    }

    async fn save_long_batch_url(
        &self,
        pairs: &[CorrelationLongPair],
        user_id: &str,
    ) -> Result<Vec<CorrelationShortPair>> {
        let mut result = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match self.save_long_url(&pair.long, user_id).await {
                Ok(short) => result.push(CorrelationShortPair {
                    correlation_id: pair.correlation_id.clone(),
                    short,
                }),
                Err(err) => {
                    warn!(long = %pair.long, %err, "skipping batch entry");
                }
            }
        }
        Ok(result)
    }

    async fn get_long_url(&self, short: &ShortCode) -> Result<String> {
        let inner = self.inner.read();
        inner
            .urls
            .get(short)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(short.clone()))
    }

    async fn get_users_urls(&self, user_id: &str) -> Result<Vec<UrlPair>> {
        let inner = self.inner.read();
        let Some(shorts) = inner.user_shorts.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(shorts
            .iter()
            .filter_map(|short| {
                inner.urls.get(short).map(|long| UrlPair {
                    short: short.clone(),
                    long: long.clone(),
                })
            })
            .collect())
    }

    async fn delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(owned) = inner.user_shorts.get_mut(user_id) else {
            return Ok(());
        };
        let mut released = Vec::new();
        for short in shorts {
            if owned.remove(short) {
                released.push(short.clone());
            }
        }
        // Keep the index from accumulating users who no longer own anything.
        if owned.is_empty() {
            inner.user_shorts.remove(user_id);
        }
        // Drop the mapping itself only once no other user still owns it.
        for short in released {
            let still_owned = inner
                .user_shorts
                .values()
                .any(|codes| codes.contains(&short));
            if !still_owned {
                inner.urls.remove(&short);
            }
        }
        Ok(())
    }

    async fn delayed_delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        self.delete_users_urls(user_id, shorts).await
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let store = InMemoryStore::new();

        let short = store
            .save_long_url("https://practicum.yandex.ru/learn/go-developer", "user-1")
            .await
            .unwrap();
        assert_eq!(short.as_str(), "8d34fd6f");

        let long = store.get_long_url(&short).await.unwrap();
        assert_eq!(long, "https://practicum.yandex.ru/learn/go-developer");
    }

    #[tokio::test]
    async fn repeated_saves_return_same_code() {
        let store = InMemoryStore::new();

        let first = store
            .save_long_url("https://example.com/a", "user-1")
            .await
            .unwrap();
        let second = store
            .save_long_url("https://example.com/a", "user-1")
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_unknown_code_is_not_found() {
        let store = InMemoryStore::new();

        let err = store
            .get_long_url(&ShortCode::new_unchecked("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn two_users_share_one_code_but_own_it_separately() {
        let store = InMemoryStore::new();

        let a = store
            .save_long_url("https://example.com/shared", "alice")
            .await
            .unwrap();
        let b = store
            .save_long_url("https://example.com/shared", "bob")
            .await
            .unwrap();
        assert_eq!(a, b);

        for user in ["alice", "bob"] {
            let urls = store.get_users_urls(user).await.unwrap();
            assert_eq!(urls.len(), 1);
            assert_eq!(urls[0].short, a);
            assert_eq!(urls[0].long, "https://example.com/shared");
        }
    }

    #[tokio::test]
    async fn users_with_no_urls_get_empty_list() {
        let store = InMemoryStore::new();
        assert!(store.get_users_urls("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_save_preserves_correlation_ids() {
        let store = InMemoryStore::new();

        let pairs = vec![
            CorrelationLongPair {
                correlation_id: "1".to_string(),
                long: "https://example.com/a".to_string(),
            },
            CorrelationLongPair {
                correlation_id: "2".to_string(),
                long: "https://example.com/b".to_string(),
            },
        ];

        let result = store.save_long_batch_url(&pairs, "user-1").await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].correlation_id, "1");
        assert_eq!(result[1].correlation_id, "2");
        assert_eq!(result[0].short, ShortCode::from_long_url("https://example.com/a"));
        assert_eq!(result[1].short, ShortCode::from_long_url("https://example.com/b"));
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_owner() {
        let store = InMemoryStore::new();

        let short = store
            .save_long_url("https://example.com/shared", "alice")
            .await
            .unwrap();
        store
            .save_long_url("https://example.com/shared", "bob")
            .await
            .unwrap();

        store
            .delete_users_urls("alice", std::slice::from_ref(&short))
            .await
            .unwrap();

        // Bob still owns the mapping, so the lookup keeps working.
        assert!(store.get_users_urls("alice").await.unwrap().is_empty());
        assert_eq!(store.get_users_urls("bob").await.unwrap().len(), 1);
        assert!(store.get_long_url(&short).await.is_ok());

        store
            .delete_users_urls("bob", std::slice::from_ref(&short))
            .await
            .unwrap();
        let err = store.get_long_url(&short).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn removing_a_users_last_code_drops_the_ownership_entry() {
        let store = InMemoryStore::new();

        let short = store
            .save_long_url("https://example.com/a", "alice")
            .await
            .unwrap();
        store
            .delete_users_urls("alice", std::slice::from_ref(&short))
            .await
            .unwrap();

        assert!(!store.inner.read().user_shorts.contains_key("alice"));
        assert!(store.get_users_urls("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_codes_the_user_does_not_own_is_a_no_op() {
        let store = InMemoryStore::new();

        let short = store
            .save_long_url("https://example.com/a", "alice")
            .await
            .unwrap();
        store
            .delete_users_urls("mallory", std::slice::from_ref(&short))
            .await
            .unwrap();

        assert!(store.get_long_url(&short).await.is_ok());
        assert_eq!(store.get_users_urls("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_saves_and_reads() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let long = format!("https://example{}.com", i);
                store.save_long_url(&long, "user-1").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let long = format!("https://example{}.com", i);
            let short = ShortCode::from_long_url(&long);
            assert_eq!(store.get_long_url(&short).await.unwrap(), long);
        }
        assert_eq!(store.get_users_urls("user-1").await.unwrap().len(), 10);
    }
}
