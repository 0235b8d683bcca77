//! Storage backends for the shortstop URL shortener.
//!
//! Three implementations of the [`Repository`] contract: a concurrent
//! in-process map, an append-only log wrapper around it, and a PostgreSQL
//! store with schema migrations and delayed batched soft-deletes. Exactly
//! one backend is selected at startup via [`Store::open`].
//!
//! [`Repository`]: shortstop_core::Repository

pub mod backend;
pub mod deleter;
pub mod file;
pub mod memory;
pub mod migrations;
pub mod postgres;

pub use backend::{StorageConfig, Store};
pub use deleter::{DelayedDeleter, FlushDeletes};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use shortstop_core::{Repository, Result, ShortCode, StorageError};
