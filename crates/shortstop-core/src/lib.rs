//! Core types and traits for the shortstop URL shortener.
//!
//! This crate provides the storage contract every backend implements,
//! the deterministic short-code generator, and the shared error taxonomy.

pub mod error;
pub mod repository;
pub mod shortcode;

pub use error::{Result, StorageError};
pub use repository::{CorrelationLongPair, CorrelationShortPair, Repository, UrlPair};
pub use shortcode::ShortCode;
