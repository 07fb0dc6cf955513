//! URL shortener service implementation.
//!
//! This crate holds the business layer that sits between the HTTP gateway
//! and a [`Repository`](shortlink_core::Repository): URL validation, short
//! code generation, and the bulk-delete pipeline. Core types are re-exported
//! from `shortlink_core`.

pub mod delete;
pub mod error;
pub mod generator;
pub mod service;

pub use delete::{BulkDeletePipeline, DeleteReport, FailedFragment};
pub use error::ShortenerError;
pub use generator::{Base58Generator, Generator};
pub use service::{BatchItem, Shortened, ShortenerService};
pub use shortlink_core::{Destination, ShortCode, StorageStats, UrlRecord};
