use crate::memory::InMemoryStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shortstop_core::{
    CorrelationLongPair, CorrelationShortPair, Repository, Result, ShortCode, StorageError,
    UrlPair,
};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// One persisted save, one line of the log.
///
/// Field names are part of the on-disk format; changing them breaks replay
/// of existing logs.
#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    #[serde(rename = "ShortURL")]
    short_url: ShortCode,
    #[serde(rename = "LongURL")]
    long_url: String,
    #[serde(rename = "UserID")]
    user_id: String,
}

/// Durable log store: an [`InMemoryStore`] for serving, plus an append-only
/// newline-delimited JSON log for crash recovery.
///
/// Startup replays the whole log into the wrapped store; every save appends
/// one record and flushes. One exclusive lock serializes the combined
/// memory-mutate-then-append sequence, so writes are totally ordered. Reads
/// bypass the lock and go straight to the wrapped store.
///
/// Soft deletion is not supported by this backend: the record schema has no
/// deleted flag, so both delete operations return
/// [`StorageError::Unsupported`].
#[derive(Debug)]
pub struct FileStore {
    mem: InMemoryStore,
    log: Mutex<BufWriter<File>>,
}

impl FileStore {
    /// Opens the log at `path`, creating it if absent, and replays every
    /// record into a fresh in-memory store. A record that fails to decode is
    /// fatal; a clean end-of-file is not.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| StorageError::Io(format!("cannot open log {}: {err}", path.display())))?;

        let mem = InMemoryStore::new();
        let reader = File::open(path)
            .map_err(|err| StorageError::Io(format!("cannot read log {}: {err}", path.display())))?;
        replay(BufReader::new(reader), &mem)?;

        Ok(Self {
            mem,
            log: Mutex::new(BufWriter::new(log)),
        })
    }

}

fn append(log: &mut BufWriter<File>, record: &LogRecord) -> Result<()> {
    serde_json::to_writer(&mut *log, record)
        .map_err(|err| StorageError::Io(format!("cannot encode log record: {err}")))?;
    log.write_all(b"\n")
        .and_then(|()| log.flush())
        .map_err(|err| StorageError::Io(format!("cannot append log record: {err}")))
}

fn replay(reader: impl BufRead, mem: &InMemoryStore) -> Result<()> {
    for line in reader.lines() {
        let line = line.map_err(|err| StorageError::Io(format!("cannot read log line: {err}")))?;
        if line.is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(&line)
            .map_err(|err| StorageError::InvalidData(format!("corrupt log record: {err}")))?;
        mem.set_long_url(record.short_url, record.long_url, &record.user_id);
    }
    Ok(())
}

#[async_trait]
impl Repository for FileStore {
    async fn save_long_url(&self, long: &str, user_id: &str) -> Result<ShortCode> {
        let short = ShortCode::from_long_url(long);
        // The lock is taken before the memory mutation and held through the
        // append, so concurrent writers commit to memory and to the log in
        // the same order. If the append fails the in-memory state is ahead
        // of disk until restart; the error is surfaced to the caller.
        let mut log = self.log.lock();
        self.mem.set_long_url(short.clone(), long.to_owned(), user_id);
        append(
            &mut log,
            &LogRecord {
                short_url: short.clone(),
                long_url: long.to_owned(),
                user_id: user_id.to_owned(),
            },
        )?;
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
        self.mem.get_long_url(short).await
    }

    async fn get_users_urls(&self, user_id: &str) -> Result<Vec<UrlPair>> {
        self.mem.get_users_urls(user_id).await
    }

    async fn delete_users_urls(&self, _user_id: &str, _shorts: &[ShortCode]) -> Result<()> {
        Err(StorageError::Unsupported("delete_users_urls"))
    }

    async fn delayed_delete_users_urls(
        &self,
        _user_id: &str,
        _shorts: &[ShortCode],
    ) -> Result<()> {
        Err(StorageError::Unsupported("delayed_delete_users_urls"))
    }

    async fn ping(&self) -> bool {
        self.mem.ping().await
    }
}
