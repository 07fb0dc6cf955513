//! Storage backends for the shortlink service.
//!
//! Three interchangeable implementations of [`Repository`]:
//!
//! - [`InMemoryRepository`]: a lock-guarded map, for tests and demos.
//! - [`FileRepository`]: an append-only newline-delimited JSON log.
//! - [`PostgresRepository`]: a SQL table with transactional bulk soft-delete.
//!
//! [`StorageBackend`] picks one at startup.

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::StorageBackend;
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use shortlink_core::{
    Destination, RecordId, Repository, Result, ShortCode, StorageError, StorageStats, UrlRecord,
};
