use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A short code together with the long URL it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPair {
    #[serde(rename = "short_url")]
    pub short: ShortCode,
    #[serde(rename = "original_url")]
    pub long: String,
}

/// One entry of a batch save request. The correlation id is a caller-supplied
/// token carried through unchanged; it has no persisted identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationLongPair {
    pub correlation_id: String,
    #[serde(rename = "original_url")]
    pub long: String,
}

/// One entry of a batch save response, matched to its request by
/// correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationShortPair {
    pub correlation_id: String,
    #[serde(rename = "short_url")]
    pub short: ShortCode,
}

/// The storage contract every backend satisfies.
///
/// A caller selects exactly one backend at startup and issues these
/// operations against it for the process lifetime. User ids are opaque
/// external identities; backends that need an internal key resolve them
/// lazily.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Inserts a mapping for `long`, or returns the existing code when the
    /// same long URL is already mapped. A code collision with a *different*
    /// long URL yields [`StorageError::Conflict`] carrying the taken code.
    ///
    /// [`StorageError::Conflict`]: crate::error::StorageError::Conflict
    async fn save_long_url(&self, long: &str, user_id: &str) -> Result<ShortCode>;

    /// Per-pair equivalent of [`save_long_url`]. A pair that cannot be
    /// stored is skipped and logged; it does not fail the batch.
    ///
    /// [`save_long_url`]: Repository::save_long_url
    async fn save_long_batch_url(
        &self,
        pairs: &[CorrelationLongPair],
        user_id: &str,
    ) -> Result<Vec<CorrelationShortPair>>;

    /// Resolves a short code. Fails with `NotFound` if the code is unknown
    /// and with `Deleted` if the mapping exists but is soft-deleted.
    async fn get_long_url(&self, short: &ShortCode) -> Result<String>;

    /// Lists the mappings owned by `user_id`. An empty vec, not an error,
    /// when the user owns nothing.
    async fn get_users_urls(&self, user_id: &str) -> Result<Vec<UrlPair>>;

    /// Synchronous soft delete of the given codes, scoped to codes owned by
    /// `user_id`. Codes the user does not own are silently unaffected.
    async fn delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()>;

    /// Asynchronous variant of [`delete_users_urls`]: enqueues the codes and
    /// returns as soon as the push is scheduled. `Ok` means accepted, not
    /// committed; deletion is eventually consistent.
    ///
    /// [`delete_users_urls`]: Repository::delete_users_urls
    async fn delayed_delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()>;

    /// Liveness probe. `true` if the backend can currently serve requests.
    async fn ping(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_pair_wire_names() {
        let pair: CorrelationLongPair = serde_json::from_str(
            r#"{"correlation_id": "req-1", "original_url": "https://example.com"}"#,
        )
        .unwrap();
        assert_eq!(pair.correlation_id, "req-1");
        assert_eq!(pair.long, "https://example.com");

        let out = CorrelationShortPair {
            correlation_id: "req-1".to_string(),
            short: ShortCode::new_unchecked("c101c693"),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains(r#""correlation_id":"req-1""#));
        assert!(json.contains(r#""short_url":"c101c693""#));
    }

    #[test]
    fn url_pair_wire_names() {
        let pair = UrlPair {
            short: ShortCode::new_unchecked("8d34fd6f"),
            long: "https://practicum.yandex.ru/learn/go-developer".to_string(),
        };
        let json = serde_json::to_string(&pair).unwrap();
        assert!(json.contains(r#""short_url":"8d34fd6f""#));
        assert!(json.contains(r#""original_url":"https://practicum.yandex.ru/learn/go-developer""#));
    }
}
