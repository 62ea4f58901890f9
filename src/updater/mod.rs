//! Scoped update runs over a bounded worker pool.
//!
//! Every feed in scope is fetched through the [`FetcherRegistry`], validated
//! and merged in its own task. A failing feed is recorded on the feed row and
//! in the [`UpdateReport`]; it never stops the other feeds.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Mutex as FeedLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::{FeedmillError, Result};
use crate::config::UpdateConfig;
use crate::domain::{Feed, FeedScope, FeedUpdate, Validators};
use crate::fetcher::favicon::FaviconResolver;
use crate::fetcher::{FetchOutcome, FetchedFeed, FetcherRegistry};
use crate::service::validate_for_merge;
use crate::store::Store;

/// Result of merging one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub feed_id: i64,
    pub inserted: usize,
    pub updated: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone)]
pub struct FeedFailure {
    pub feed_id: i64,
    pub url: String,
    pub error: String,
    /// Whether the feed is now flagged for attention.
    pub needs_attention: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub merged: Vec<MergeSummary>,
    pub not_modified: Vec<i64>,
    pub failures: Vec<FeedFailure>,
}

impl UpdateReport {
    pub fn attempted(&self) -> usize {
        self.merged.len() + self.not_modified.len() + self.failures.len()
    }

    pub fn inserted(&self) -> usize {
        self.merged.iter().map(|m| m.inserted).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum FeedResult {
    Merged(MergeSummary),
    NotModified(i64),
    Failed(FeedFailure),
}

#[derive(Clone)]
pub struct Updater {
    store: Arc<dyn Store>,
    fetchers: Arc<FetcherRegistry>,
    favicons: Option<Arc<FaviconResolver>>,
    config: UpdateConfig,
    workers: usize,
    locks: Arc<Mutex<HashMap<i64, Arc<FeedLock<()>>>>>,
}

impl Updater {
    pub fn new(
        store: Arc<dyn Store>,
        fetchers: FetcherRegistry,
        config: UpdateConfig,
        workers: usize,
    ) -> Self {
        Self {
            store,
            fetchers: Arc::new(fetchers),
            favicons: None,
            config,
            workers: workers.max(1),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Favicon cache to reset at the start of each run.
    pub fn with_favicons(mut self, favicons: Arc<FaviconResolver>) -> Self {
        self.favicons = Some(favicons);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetches, merges and prunes every non-deleted feed in `scope`.
    ///
    /// Runs that are not limited to a single feed first purge feeds and
    /// folders whose soft delete is older than the purge delay.
    pub async fn update_all(&self, scope: &FeedScope) -> Result<UpdateReport> {
        if let Some(favicons) = &self.favicons {
            favicons.clear_cache();
        }

        if scope.feed_id.is_none() {
            self.purge_deleted(scope.user_id.as_deref())?;
        }

        let feeds = self.store.load_feeds(scope)?;
        info!(feeds = feeds.len(), workers = self.workers, "updating feeds");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for feed in feeds {
            let updater = self.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                updater.update_feed(&feed).await
            });
        }

        let mut report = UpdateReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(FeedResult::Merged(summary)) => report.merged.push(summary),
                Ok(FeedResult::NotModified(feed_id)) => report.not_modified.push(feed_id),
                Ok(FeedResult::Failed(failure)) => report.failures.push(failure),
                Err(e) => error!(error = %e, "update task failed"),
            }
        }

        info!(
            merged = report.merged.len(),
            not_modified = report.not_modified.len(),
            failed = report.failures.len(),
            inserted = report.inserted(),
            "update finished"
        );

        Ok(report)
    }

    /// Updates one feed through the same path as [`update_all`](Self::update_all).
    /// Resolving `cancel` first aborts the in-flight fetch; a merge already
    /// running commits or rolls back as a whole.
    pub async fn refresh<C>(&self, feed_id: i64, cancel: C) -> Result<UpdateReport>
    where
        C: Future<Output = ()>,
    {
        let feed = self
            .store
            .get_feed(feed_id)?
            .ok_or(FeedmillError::FeedNotFound(feed_id))?;
        if feed.is_deleted() {
            return Err(FeedmillError::FeedNotFound(feed_id));
        }

        let scope = FeedScope::feed(feed_id);
        tokio::select! {
            report = self.update_all(&scope) => report,
            _ = cancel => {
                debug!(feed = %feed.url, "refresh cancelled");
                Err(FeedmillError::Cancelled)
            }
        }
    }

    /// Fetches a stored feed without merging or recording anything.
    pub async fn fetch_one(&self, feed_id: i64) -> Result<FetchOutcome> {
        let feed = self
            .store
            .get_feed(feed_id)?
            .ok_or(FeedmillError::FeedNotFound(feed_id))?;

        self.fetchers.fetch(&feed.url, &feed.validators()).await
    }

    pub async fn fetch_url(&self, url: &str, validators: &Validators) -> Result<FetchOutcome> {
        self.fetchers.fetch(url, validators).await
    }

    /// Upserts fetched items, writes back feed metadata and applies retention.
    pub fn merge(&self, feed: &Feed, fetched: FetchedFeed) -> Result<MergeSummary> {
        validate_for_merge(feed, &fetched.items)?;

        let stats = self.store.upsert_items(feed.id, &fetched.items)?;

        // A title the user chose is kept.
        let update = FeedUpdate {
            title: if feed.title.is_none() {
                fetched.title
            } else {
                None
            },
            link: fetched.link,
            favicon_link: fetched.favicon_link,
            etag: fetched.validators.etag,
            last_modified: fetched.validators.last_modified,
            last_fetched_at: Some(Utc::now()),
            reset_failures: true,
        };
        self.store.update_feed_metadata(feed.id, &update)?;

        let pruned = match self.config.retention {
            0 => 0,
            keep => self.store.delete_items_older_than(feed.id, keep)?,
        };

        info!(
            feed = %feed.url,
            inserted = stats.inserted,
            updated = stats.updated,
            pruned,
            "merged"
        );

        Ok(MergeSummary {
            feed_id: feed.id,
            inserted: stats.inserted,
            updated: stats.updated,
            pruned,
        })
    }

    async fn update_feed(&self, snapshot: &Feed) -> FeedResult {
        let lock = self.lock_for(snapshot.id);
        let _guard = lock.lock().await;

        // Whoever held the lock may have changed or deleted the feed.
        let feed = match self.store.get_feed(snapshot.id) {
            Ok(Some(feed)) if !feed.is_deleted() => feed,
            Ok(_) => {
                let gone = FeedmillError::FeedNotFound(snapshot.id);
                return self.record_failure(snapshot, &gone);
            }
            Err(e) => return self.record_failure(snapshot, &e),
        };

        match self.fetch_and_merge(&feed).await {
            Ok(result) => result,
            Err(e) => self.record_failure(&feed, &e),
        }
    }

    async fn fetch_and_merge(&self, feed: &Feed) -> Result<FeedResult> {
        match self.fetchers.fetch(&feed.url, &feed.validators()).await? {
            FetchOutcome::NotModified => {
                debug!(feed = %feed.url, "not modified");
                let update = FeedUpdate {
                    last_fetched_at: Some(Utc::now()),
                    reset_failures: true,
                    ..Default::default()
                };
                self.store.update_feed_metadata(feed.id, &update)?;
                Ok(FeedResult::NotModified(feed.id))
            }
            FetchOutcome::Fetched(fetched) => self.merge(feed, fetched).map(FeedResult::Merged),
        }
    }

    fn record_failure(&self, feed: &Feed, error: &FeedmillError) -> FeedResult {
        let mut failure = FeedFailure {
            feed_id: feed.id,
            url: feed.url.clone(),
            error: error.to_string(),
            needs_attention: feed.needs_attention,
        };

        if !error.is_fetch_failure() {
            warn!(feed = %feed.url, error = %error, "update failed");
            return FeedResult::Failed(failure);
        }

        match self
            .store
            .record_fetch_failure(feed.id, &failure.error, self.config.max_failures)
        {
            Ok(recorded) => {
                failure.needs_attention = recorded.needs_attention;
                warn!(
                    feed = %feed.url,
                    error = %error,
                    failures = recorded.failure_count,
                    "fetch failed"
                );
                if recorded.needs_attention && !feed.needs_attention {
                    warn!(feed = %feed.url, "feed flagged for attention");
                }
            }
            Err(e) => error!(feed = %feed.url, error = %e, "could not record fetch failure"),
        }

        FeedResult::Failed(failure)
    }

    fn purge_deleted(&self, user_id: Option<&str>) -> Result<()> {
        let before = Utc::now() - self.config.purge_after();
        let feeds = self.store.purge_deleted_feeds(before, user_id)?;
        let folders = self.store.purge_deleted_folders(before, user_id)?;

        if feeds + folders > 0 {
            info!(feeds, folders, "purged deleted feeds and folders");
        }
        Ok(())
    }

    fn lock_for(&self, feed_id: i64) -> Arc<FeedLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(feed_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Fetcher;
    use crate::store::SqliteStore;
    use async_trait::async_trait;

    /// Answers not-modified and remembers the validators it was sent.
    #[derive(Default)]
    struct RecordingFetcher {
        seen: Mutex<Vec<Validators>>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        fn can_handle(&self, _url: &str) -> bool {
            true
        }

        async fn fetch(&self, _url: &str, validators: &Validators) -> Result<FetchOutcome> {
            self.seen.lock().unwrap().push(validators.clone());
            Ok(FetchOutcome::NotModified)
        }
    }

    fn recording_updater() -> (Updater, Arc<SqliteStore>, Arc<RecordingFetcher>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fetcher = Arc::new(RecordingFetcher::default());
        let updater = Updater::new(
            store.clone(),
            FetcherRegistry::new().with(fetcher.clone()),
            UpdateConfig::default(),
            1,
        );
        (updater, store, fetcher)
    }

    fn updater() -> Updater {
        Updater::new(
            Arc::new(SqliteStore::in_memory().unwrap()),
            FetcherRegistry::new(),
            UpdateConfig::default(),
            0,
        )
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        assert_eq!(updater().workers(), 1);
    }

    #[test]
    fn test_same_feed_shares_lock() {
        let updater = updater();
        let a = updater.lock_for(1);
        let b = updater.clone().lock_for(1);
        let c = updater.lock_for(2);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_report_counts() {
        let report = UpdateReport {
            merged: vec![MergeSummary {
                feed_id: 1,
                inserted: 3,
                updated: 1,
                pruned: 0,
            }],
            not_modified: vec![2],
            failures: vec![FeedFailure {
                feed_id: 3,
                url: "https://example.com".into(),
                error: "boom".into(),
                needs_attention: false,
            }],
        };

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.inserted(), 3);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_missing_feed() {
        let updater = updater();
        assert!(matches!(
            updater.fetch_one(42).await,
            Err(FeedmillError::FeedNotFound(42))
        ));
        assert!(matches!(
            updater.refresh(42, std::future::pending()).await,
            Err(FeedmillError::FeedNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_update_uses_current_feed_row() {
        let (updater, store, fetcher) = recording_updater();
        let id = store.add_feed(&Feed::new("alice", "https://example.com/feed")).unwrap();
        let stale = store.get_feed(id).unwrap().unwrap();

        let update = FeedUpdate {
            etag: Some("\"v2\"".into()),
            ..Default::default()
        };
        store.update_feed_metadata(id, &update).unwrap();

        let result = updater.update_feed(&stale).await;
        assert!(matches!(result, FeedResult::NotModified(fid) if fid == id));
        assert_eq!(
            fetcher.seen.lock().unwrap()[0].etag.as_deref(),
            Some("\"v2\"")
        );
    }

    #[tokio::test]
    async fn test_update_skips_feed_deleted_while_waiting() {
        let (updater, store, fetcher) = recording_updater();
        let id = store.add_feed(&Feed::new("alice", "https://example.com/feed")).unwrap();
        let stale = store.get_feed(id).unwrap().unwrap();
        store.set_feed_deleted(id, Some(Utc::now())).unwrap();

        let result = updater.update_feed(&stale).await;
        assert!(matches!(result, FeedResult::Failed(ref f) if f.feed_id == id));
        assert!(fetcher.seen.lock().unwrap().is_empty());
        assert_eq!(store.get_feed(id).unwrap().unwrap().failure_count, 0);
    }
}
