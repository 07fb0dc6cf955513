use shortlink_core::{RecordId, Repository, StorageError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of fragment resolutions allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// A fragment whose resolution failed. It is never deleted.
#[derive(Debug, Clone)]
pub struct FailedFragment {
    pub fragment: String,
    pub error: StorageError,
}

/// Outcome of one bulk delete request.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    /// Fragments that resolved to a record and were handed to the commit.
    pub deleted: Vec<String>,
    /// Fragments with no record of the owner ending in them.
    pub unmatched: Vec<String>,
    /// Fragments whose lookup failed.
    pub failed: Vec<FailedFragment>,
    /// Records the commit actually flipped. Already deleted records and
    /// backends without delete support do not count.
    pub flipped: u64,
}

impl DeleteReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

type Resolution = Result<Option<RecordId>, StorageError>;

/// Token-scoped bulk soft delete.
///
/// A request runs in three steps:
///
/// 1. every fragment is resolved to a record id with
///    [`Repository::resolve_id`], concurrently, on its own task;
/// 2. all lookups are joined before anything is written;
/// 3. the resolved ids go to [`Repository::bulk_soft_delete`] in one call.
///
/// The semaphore is shared by every request running through this pipeline,
/// so a single huge delete list cannot flood the backend with lookups.
/// Dropping the future returned by [`run`](Self::run) aborts outstanding
/// lookups; once the commit has started, its atomicity is up to the backend.
#[derive(Clone)]
pub struct BulkDeletePipeline {
    repository: Arc<dyn Repository>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for BulkDeletePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkDeletePipeline")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl BulkDeletePipeline {
    /// Creates a pipeline allowing `concurrency` lookups in flight. Zero is
    /// raised to one.
    pub fn new(repository: Arc<dyn Repository>, concurrency: usize) -> Self {
        Self {
            repository,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Soft-deletes every record of `owner_token` matched by a fragment.
    ///
    /// Lookup failures are collected in the report and do not stop the
    /// other fragments. Only a failed commit is an error, in which case
    /// nothing was deleted.
    pub async fn run(
        &self,
        fragments: Vec<String>,
        owner_token: &str,
    ) -> Result<DeleteReport, StorageError> {
        if fragments.is_empty() {
            return Ok(DeleteReport::default());
        }

        let resolutions = self.resolve_all(&fragments, owner_token).await;

        let mut report = DeleteReport::default();
        let mut seen = HashSet::with_capacity(fragments.len());
        let mut ids = Vec::with_capacity(fragments.len());

        for (fragment, resolution) in fragments.into_iter().zip(resolutions) {
            match resolution {
                Ok(Some(id)) => {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                    report.deleted.push(fragment);
                }
                Ok(None) => {
                    debug!(fragment = %fragment, "fragment matched no record");
                    report.unmatched.push(fragment);
                }
                Err(error) => {
                    warn!(fragment = %fragment, %error, "fragment lookup failed; not deleting it");
                    report.failed.push(FailedFragment { fragment, error });
                }
            }
        }

        if ids.is_empty() {
            debug!(
                unmatched = report.unmatched.len(),
                failed = report.failed.len(),
                "nothing to delete"
            );
            return Ok(report);
        }

        report.flipped = match self.repository.bulk_soft_delete(&ids).await {
            Ok(flipped) => flipped,
            Err(err) => {
                error!(ids = ids.len(), error = %err, "bulk soft delete failed");
                return Err(err);
            }
        };

        info!(
            requested = report.deleted.len() + report.unmatched.len() + report.failed.len(),
            resolved = ids.len(),
            flipped = report.flipped,
            unmatched = report.unmatched.len(),
            failed = report.failed.len(),
            "bulk delete committed"
        );
        Ok(report)
    }

    /// Resolves every fragment and returns the results in input order.
    async fn resolve_all(&self, fragments: &[String], owner_token: &str) -> Vec<Resolution> {
        let mut results: Vec<Option<Resolution>> = Vec::with_capacity(fragments.len());
        results.resize_with(fragments.len(), || None);

        let mut tasks = JoinSet::new();
        for (index, fragment) in fragments.iter().enumerate() {
            // An empty fragment would suffix-match every record of the owner.
            if fragment.is_empty() {
                results[index] = Some(Ok(None));
                continue;
            }

            let repository = Arc::clone(&self.repository);
            let permits = Arc::clone(&self.permits);
            let fragment = fragment.clone();
            let owner_token = owner_token.to_owned();

            tasks.spawn(async move {
                let resolution = match permits.acquire_owned().await {
                    Ok(_permit) => repository.resolve_id(&fragment, &owner_token).await,
                    Err(_) => Err(StorageError::Unavailable(
                        "delete pipeline is shut down".to_string(),
                    )),
                };
                (index, resolution)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, resolution)) => results[index] = Some(resolution),
                Err(err) => warn!(error = %err, "fragment lookup task did not finish"),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(StorageError::Unavailable(
                        "fragment lookup task did not finish".to_string(),
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shortlink_core::{Destination, ShortCode, StorageStats, UrlRecord};
    use shortlink_storage::InMemoryRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn fragments(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn seeded() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.add(&code("KJYUS"), "https://example.com/a", "tok1")
            .await
            .unwrap();
        repo.add(&code("CTRL1"), "https://example.com/b", "tok1")
            .await
            .unwrap();
        repo.add(&code("OTHER"), "https://example.com/c", "tok2")
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn deletes_only_resolved_records() {
        let repo = seeded().await;
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let report = pipeline
            .run(fragments(&["KJYUS", "missing"]), "tok1")
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["KJYUS".to_string()]);
        assert_eq!(report.unmatched, vec!["missing".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(report.flipped, 1);

        assert_eq!(
            repo.get(&code("KJYUS"), "tok1").await.unwrap(),
            Destination::Gone
        );
        assert_eq!(
            repo.get(&code("CTRL1"), "tok1").await.unwrap().as_str(),
            "https://example.com/b"
        );
    }

    #[tokio::test]
    async fn other_owners_records_are_untouched() {
        let repo = seeded().await;
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let report = pipeline.run(fragments(&["OTHER"]), "tok1").await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.unmatched, vec!["OTHER".to_string()]);
        assert!(!repo.get(&code("OTHER"), "tok2").await.unwrap().is_gone());
    }

    #[tokio::test]
    async fn suffix_fragments_and_duplicates_resolve_once() {
        let repo = seeded().await;
        let pipeline = BulkDeletePipeline::new(repo.clone(), 2);

        let report = pipeline
            .run(fragments(&["YUS", "KJYUS", "YUS"]), "tok1")
            .await
            .unwrap();

        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.flipped, 1);
    }

    #[tokio::test]
    async fn empty_fragment_matches_nothing() {
        let repo = seeded().await;
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let report = pipeline.run(fragments(&[""]), "tok1").await.unwrap();

        assert_eq!(report.unmatched, vec![String::new()]);
        assert_eq!(report.flipped, 0);
        assert!(repo
            .list_by_owner("tok1")
            .await
            .unwrap()
            .iter()
            .all(|r| !r.deleted));
    }

    #[tokio::test]
    async fn repeat_delete_flips_nothing() {
        let repo = seeded().await;
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        pipeline.run(fragments(&["KJYUS"]), "tok1").await.unwrap();
        let again = pipeline.run(fragments(&["KJYUS"]), "tok1").await.unwrap();

        assert_eq!(again.deleted, vec!["KJYUS".to_string()]);
        assert_eq!(again.flipped, 0);
    }

    /// Wraps the in-memory backend and injects failures.
    struct Faulty {
        inner: InMemoryRepository,
        fail_fragment: Option<&'static str>,
        fail_commit: bool,
        commits: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Faulty {
        fn new(inner: InMemoryRepository) -> Self {
            Self {
                inner,
                fail_fragment: None,
                fail_commit: false,
                commits: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Repository for Faulty {
        async fn add(
            &self,
            code: &ShortCode,
            original_url: &str,
            owner_token: &str,
        ) -> shortlink_core::Result<()> {
            self.inner.add(code, original_url, owner_token).await
        }

        async fn get(&self, code: &ShortCode, owner_token: &str) -> shortlink_core::Result<Destination> {
            self.inner.get(code, owner_token).await
        }

        async fn token_exists(&self, token: &str) -> shortlink_core::Result<bool> {
            self.inner.token_exists(token).await
        }

        async fn list_by_owner(&self, token: &str) -> shortlink_core::Result<Vec<UrlRecord>> {
            self.inner.list_by_owner(token).await
        }

        async fn resolve_id(
            &self,
            fragment: &str,
            owner_token: &str,
        ) -> shortlink_core::Result<Option<RecordId>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_fragment == Some(fragment) {
                return Err(StorageError::Timeout(fragment.to_string()));
            }
            self.inner.resolve_id(fragment, owner_token).await
        }

        async fn bulk_soft_delete(&self, ids: &[RecordId]) -> shortlink_core::Result<u64> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if self.fail_commit {
                return Err(StorageError::Unavailable("connection reset".to_string()));
            }
            self.inner.bulk_soft_delete(ids).await
        }

        async fn ping(&self) -> bool {
            true
        }

        async fn original_url_exists(&self, original_url: &str) -> shortlink_core::Result<bool> {
            self.inner.original_url_exists(original_url).await
        }

        async fn stats(&self) -> shortlink_core::Result<StorageStats> {
            self.inner.stats().await
        }
    }

    async fn faulty() -> Faulty {
        let inner = InMemoryRepository::new();
        for c in ["KJYUS", "CTRL1", "ABCDE"] {
            inner
                .add(&code(c), &format!("https://example.com/{c}"), "tok1")
                .await
                .unwrap();
        }
        Faulty::new(inner)
    }

    #[tokio::test]
    async fn failed_lookup_is_reported_and_not_deleted() {
        let mut repo = faulty().await;
        repo.fail_fragment = Some("CTRL1");
        let repo = Arc::new(repo);
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let report = pipeline
            .run(fragments(&["KJYUS", "CTRL1"]), "tok1")
            .await
            .unwrap();

        assert!(report.is_partial());
        assert_eq!(report.deleted, vec!["KJYUS".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].fragment, "CTRL1");
        assert!(matches!(report.failed[0].error, StorageError::Timeout(_)));

        assert!(repo.get(&code("KJYUS"), "tok1").await.unwrap().is_gone());
        assert!(!repo.get(&code("CTRL1"), "tok1").await.unwrap().is_gone());
    }

    #[tokio::test]
    async fn commit_failure_fails_the_request() {
        let mut repo = faulty().await;
        repo.fail_commit = true;
        let repo = Arc::new(repo);
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let err = pipeline
            .run(fragments(&["KJYUS", "ABCDE"]), "tok1")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(!repo.get(&code("KJYUS"), "tok1").await.unwrap().is_gone());
    }

    #[tokio::test]
    async fn commit_is_skipped_when_nothing_resolved() {
        let repo = Arc::new(faulty().await);
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        let report = pipeline
            .run(fragments(&["nope", "nada"]), "tok1")
            .await
            .unwrap();
        assert_eq!(report.unmatched.len(), 2);
        assert_eq!(repo.commits.load(Ordering::SeqCst), 0);

        pipeline.run(Vec::new(), "tok1").await.unwrap();
        assert_eq!(repo.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn commit_happens_once_per_request() {
        let repo = Arc::new(faulty().await);
        let pipeline = BulkDeletePipeline::new(repo.clone(), DEFAULT_CONCURRENCY);

        pipeline
            .run(fragments(&["KJYUS", "CTRL1", "ABCDE"]), "tok1")
            .await
            .unwrap();

        assert_eq!(repo.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lookups_respect_the_concurrency_cap() {
        let repo = Arc::new(faulty().await);
        let pipeline = BulkDeletePipeline::new(repo.clone(), 2);

        let many: Vec<String> = (0..20).map(|i| format!("frag{i}")).collect();
        let report = pipeline.run(many, "tok1").await.unwrap();

        assert_eq!(report.unmatched.len(), 20);
        assert!(repo.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
