use crate::{FileRepository, InMemoryRepository, PostgresRepository};
use shortlink_core::{Repository, Result};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Which storage backend the service runs on.
///
/// Chosen once at startup: a database DSN wins over a file path, which wins
/// over the in-memory default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { dsn: String },
    File { path: PathBuf },
    InMemory,
}

impl StorageBackend {
    /// Picks a backend from optional settings. Empty values count as unset.
    pub fn select(database_dsn: Option<&str>, file_storage_path: Option<&Path>) -> Self {
        if let Some(dsn) = database_dsn.filter(|dsn| !dsn.trim().is_empty()) {
            return StorageBackend::Postgres {
                dsn: dsn.to_string(),
            };
        }
        if let Some(path) = file_storage_path.filter(|path| !path.as_os_str().is_empty()) {
            return StorageBackend::File {
                path: path.to_path_buf(),
            };
        }
        StorageBackend::InMemory
    }

    /// Opens the backend. For Postgres this connects and creates the schema.
    pub async fn open(self) -> Result<Arc<dyn Repository>> {
        info!(backend = %self, "opening storage");
        let repository: Arc<dyn Repository> = match self {
            StorageBackend::Postgres { dsn } => {
                let repository = PostgresRepository::connect(&dsn).await?;
                repository.init_schema().await?;
                Arc::new(repository)
            }
            StorageBackend::File { path } => Arc::new(FileRepository::new(path)),
            StorageBackend::InMemory => Arc::new(InMemoryRepository::new()),
        };
        Ok(repository)
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // The DSN may carry credentials.
            StorageBackend::Postgres { .. } => write!(f, "postgres"),
            StorageBackend::File { path } => write!(f, "file({})", path.display()),
            StorageBackend::InMemory => write!(f, "memory"),
        }
    }
}
