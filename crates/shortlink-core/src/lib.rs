//! Core types and traits for the shortlink URL shortener.
//!
//! This crate holds the record model and the [`Repository`] contract that
//! every storage backend implements. Nothing here knows which backend is in
//! use; callers hold an `Arc<dyn Repository>` chosen once at startup.

pub mod base58;
pub mod error;
pub mod repository;
pub mod shortcode;

pub use base58::ShortCodeBase58;
pub use error::{Result, StorageError};
pub use repository::{Destination, RecordId, Repository, StorageStats, UrlRecord};
pub use shortcode::ShortCode;
