use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A stored URL record.
///
/// Records are created once by [`Repository::add`] and are never removed;
/// the only mutation is flipping `deleted` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The lookup key.
    pub short_code: ShortCode,
    /// The redirect target.
    pub original_url: String,
    /// Opaque session token of the submitting client. Empty means "no cookie".
    pub owner_token: String,
    /// Soft-delete marker.
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a live (not deleted) record.
    pub fn new(
        short_code: ShortCode,
        original_url: impl Into<String>,
        owner_token: impl Into<String>,
    ) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            owner_token: owner_token.into(),
            deleted: false,
        }
    }
}

/// Backend-internal identifier of a record, used only by the bulk-delete
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a successful [`Repository::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The record is live; redirect here.
    Active(String),
    /// The record exists but was soft-deleted.
    Gone,
}

impl Destination {
    /// Returns the redirect target, or `""` for a soft-deleted record.
    pub fn as_str(&self) -> &str {
        match self {
            Destination::Active(url) => url,
            Destination::Gone => "",
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Destination::Gone)
    }
}

/// Aggregate counters reported by [`Repository::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Number of stored short URLs.
    pub urls: u64,
    /// Number of distinct owner tokens.
    pub users: u64,
}

/// The storage contract every backend satisfies.
///
/// Backends differ in consistency and in how much of the contract they
/// support. Operations a backend cannot perform return inert defaults
/// (`None`, `0`, `false`) rather than errors.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Inserts a new record. On failure no partial write is visible.
    async fn add(&self, code: &ShortCode, original_url: &str, owner_token: &str) -> Result<()>;

    /// Resolves a short code.
    ///
    /// Returns `Err(StorageError::NotFound)` for an unknown code and
    /// `Ok(Destination::Gone)` for a soft-deleted one.
    async fn get(&self, code: &ShortCode, owner_token: &str) -> Result<Destination>;

    /// Reports whether any record is owned by `token`.
    async fn token_exists(&self, token: &str) -> Result<bool>;

    /// Returns every record owned by `token`, soft-deleted ones included,
    /// in unspecified order.
    async fn list_by_owner(&self, token: &str) -> Result<Vec<UrlRecord>>;

    /// Maps a short-code suffix plus owner to an internal id.
    ///
    /// Returns `Ok(None)` when no record of that owner ends with `fragment`.
    async fn resolve_id(&self, fragment: &str, owner_token: &str) -> Result<Option<RecordId>>;

    /// Marks every id as deleted in one all-or-nothing unit and returns the
    /// number of records touched. Unknown ids are a no-match, not an error.
    async fn bulk_soft_delete(&self, ids: &[RecordId]) -> Result<u64>;

    /// Liveness check. Backends without a connection always report healthy.
    async fn ping(&self) -> bool;

    /// Reports whether `original_url` has been stored before.
    async fn original_url_exists(&self, original_url: &str) -> Result<bool>;

    /// Counts stored URLs and distinct owners.
    async fn stats(&self) -> Result<StorageStats>;
}
