use crate::file::FileStore;
use crate::memory::InMemoryStore;
use crate::postgres::PostgresStore;
use async_trait::async_trait;
use shortstop_core::{
    CorrelationLongPair, CorrelationShortPair, Repository, Result, ShortCode, UrlPair,
};
use std::path::PathBuf;
use tracing::info;

/// What the startup layer hands over to pick a backend. Both fields are
/// optional; the priority is DSN, then file path, then in-memory.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// PostgreSQL connection string.
    pub database_dsn: Option<String>,
    /// Path of the append-only record log.
    pub file_path: Option<PathBuf>,
}

/// The backend selected at startup. Constructed once via [`Store::open`];
/// there is no runtime switching.
pub enum Store {
    Postgres(PostgresStore),
    File(FileStore),
    Memory(InMemoryStore),
}

impl Store {
    /// Opens exactly one backend: a relational DSN wins over a log file
    /// path, which wins over the in-memory default. Startup failures
    /// (unreachable database, failed migration, unreadable log) are
    /// returned, not recovered.
    pub async fn open(config: StorageConfig) -> Result<Self> {
        if let Some(dsn) = config.database_dsn {
            info!("using postgres storage backend");
            return Ok(Self::Postgres(PostgresStore::connect(&dsn).await?));
        }
        if let Some(path) = config.file_path {
            info!(path = %path.display(), "using durable log storage backend");
            return Ok(Self::File(FileStore::open(path)?));
        }
        info!("using in-memory storage backend");
        Ok(Self::Memory(InMemoryStore::new()))
    }
}

#[async_trait]
impl Repository for Store {
    async fn save_long_url(&self, long: &str, user_id: &str) -> Result<ShortCode> {
        match self {
            Self::Postgres(store) => store.save_long_url(long, user_id).await,
            Self::File(store) => store.save_long_url(long, user_id).await,
            Self::Memory(store) => store.save_long_url(long, user_id).await,
        }
    }

    async fn save_long_batch_url(
        &self,
        pairs: &[CorrelationLongPair],
        user_id: &str,
    ) -> Result<Vec<CorrelationShortPair>> {
        match self {
            Self::Postgres(store) => store.save_long_batch_url(pairs, user_id).await,
            Self::File(store) => store.save_long_batch_url(pairs, user_id).await,
            Self::Memory(store) => store.save_long_batch_url(pairs, user_id).await,
        }
    }

    async fn get_long_url(&self, short: &ShortCode) -> Result<String> {
        match self {
            Self::Postgres(store) => store.get_long_url(short).await,
            Self::File(store) => store.get_long_url(short).await,
            Self::Memory(store) => store.get_long_url(short).await,
        }
    }

    async fn get_users_urls(&self, user_id: &str) -> Result<Vec<UrlPair>> {
        match self {
            Self::Postgres(store) => store.get_users_urls(user_id).await,
            Self::File(store) => store.get_users_urls(user_id).await,
            Self::Memory(store) => store.get_users_urls(user_id).await,
        }
    }

    async fn delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        match self {
            Self::Postgres(store) => store.delete_users_urls(user_id, shorts).await,
            Self::File(store) => store.delete_users_urls(user_id, shorts).await,
            Self::Memory(store) => store.delete_users_urls(user_id, shorts).await,
        }
    }

    async fn delayed_delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        match self {
            Self::Postgres(store) => store.delayed_delete_users_urls(user_id, shorts).await,
            Self::File(store) => store.delayed_delete_users_urls(user_id, shorts).await,
            Self::Memory(store) => store.delayed_delete_users_urls(user_id, shorts).await,
        }
    }

    async fn ping(&self) -> bool {
        match self {
            Self::Postgres(store) => store.ping().await,
            Self::File(store) => store.ping().await,
            Self::Memory(store) => store.ping().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_in_memory() {
        let store = Store::open(StorageConfig::default()).await.unwrap();
        assert!(matches!(store, Store::Memory(_)));
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn file_path_selects_the_durable_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_dsn: None,
            file_path: Some(dir.path().join("urls.log")),
        };

        let store = Store::open(config).await.unwrap();
        assert!(matches!(store, Store::File(_)));

        let short = store
            .save_long_url("https://example.com/a", "user-1")
            .await
            .unwrap();
        assert_eq!(
            store.get_long_url(&short).await.unwrap(),
            "https://example.com/a"
        );
    }
}
