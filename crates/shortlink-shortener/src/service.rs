use crate::delete::{BulkDeletePipeline, DeleteReport, DEFAULT_CONCURRENCY};
use crate::error::ShortenerError;
use crate::generator::{Base58Generator, Generator};
use serde::{Deserialize, Serialize};
use shortlink_core::{Destination, Repository, ShortCode, StorageStats, UrlRecord};
use std::sync::Arc;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, ShortenerError>;

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: ShortCode,
    /// The original URL had been stored before this call.
    pub already_exists: bool,
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// The service the gateway talks to.
///
/// This wraps a [`Repository`] and a [`Generator`] to handle:
/// - URL validation
/// - deterministic short code generation
/// - the bulk delete pipeline
///
/// The generator may map two URLs to one code; the backend's `add` policy
/// decides what happens then. No collision retry is performed.
pub struct ShortenerService<G = Base58Generator> {
    repository: Arc<dyn Repository>,
    generator: Arc<G>,
    pipeline: BulkDeletePipeline,
}

impl<G> Clone for ShortenerService<G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: Arc::clone(&self.generator),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<G: std::fmt::Debug> std::fmt::Debug for ShortenerService<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortenerService")
            .field("generator", &self.generator)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl ShortenerService<Base58Generator> {
    /// Creates a service with the default generator and fan-out cap.
    pub fn with_defaults(repository: Arc<dyn Repository>) -> Self {
        Self::new(repository, Base58Generator::default(), DEFAULT_CONCURRENCY)
    }
}

impl<G: Generator> ShortenerService<G> {
    pub fn new(repository: Arc<dyn Repository>, generator: G, delete_concurrency: usize) -> Self {
        let pipeline = BulkDeletePipeline::new(Arc::clone(&repository), delete_concurrency);
        Self {
            repository,
            generator: Arc::new(generator),
            pipeline,
        }
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        // Such a URL could never be sent back in a `Location` header.
        if url.chars().any(char::is_control) {
            return Err(ShortenerError::InvalidUrl(
                "URL must not contain control characters".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };
        if scheme.is_empty() || rest.is_empty() || rest.starts_with('/') {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        Ok(())
    }

    /// Whether `url` was stored before. A failing check only loses the
    /// signal, so it is logged and read as `false`.
    async fn seen_before(&self, url: &str) -> bool {
        match self.repository.original_url_exists(url).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(error = %err, "original url lookup failed");
                false
            }
        }
    }

    /// Shortens `original_url` on behalf of `owner_token`.
    pub async fn shorten(&self, original_url: &str, owner_token: &str) -> Result<Shortened> {
        Self::validate_url(original_url)?;

        let already_exists = self.seen_before(original_url).await;
        let code = self.generator.generate(original_url);
        self.repository
            .add(&code, original_url, owner_token)
            .await?;

        debug!(code = %code, already_exists, "shortened url");
        Ok(Shortened {
            code,
            already_exists,
        })
    }

    /// Shortens every item, keeping each `correlation_id`.
    ///
    /// All URLs are validated before anything is stored.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner_token: &str,
    ) -> Result<Vec<(String, ShortCode)>> {
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let mut shortened = Vec::with_capacity(items.len());
        for item in items {
            let code = self.generator.generate(&item.original_url);
            self.repository
                .add(&code, &item.original_url, owner_token)
                .await?;
            shortened.push((item.correlation_id, code));
        }

        debug!(count = shortened.len(), "shortened batch");
        Ok(shortened)
    }

    /// Looks up where `code` points.
    ///
    /// A string that cannot be a short code is reported as not found.
    pub async fn resolve(&self, code: &str) -> Result<Destination> {
        let code =
            ShortCode::new(code).map_err(|_| ShortenerError::NotFound(code.to_string()))?;
        Ok(self.repository.get(&code, "").await?)
    }

    /// Lists the records of `owner_token`, soft-deleted ones included.
    pub async fn list(&self, owner_token: &str) -> Result<Vec<UrlRecord>> {
        if owner_token.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.repository.list_by_owner(owner_token).await?)
    }

    /// Soft-deletes the records of `owner_token` whose codes end with one of
    /// `fragments`.
    pub async fn delete(&self, fragments: Vec<String>, owner_token: &str) -> Result<DeleteReport> {
        Ok(self.pipeline.run(fragments, owner_token).await?)
    }

    pub async fn token_exists(&self, token: &str) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.repository.token_exists(token).await?)
    }

    pub async fn ping(&self) -> bool {
        self.repository.ping().await
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(self.repository.stats().await?)
    }
}
