use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use url::Url;

use crate::app::{FeedmillError, Result};
use crate::domain::{Feed, FeedScope, Item, Validators};
use crate::fetcher::{FetchOutcome, FetchedFeed};
use crate::service::folder::owned_folder;
use crate::service::{validate_name, ValidationError};
use crate::store::Store;
use crate::updater::Updater;

pub struct FeedService {
    store: Arc<dyn Store>,
    updater: Updater,
    purge_after: Duration,
}

impl FeedService {
    pub fn new(store: Arc<dyn Store>, updater: Updater, purge_after: Duration) -> Self {
        Self {
            store,
            updater,
            purge_after,
        }
    }

    pub fn find(&self, user_id: &str, id: i64) -> Result<Feed> {
        owned_feed(self.store.as_ref(), user_id, id)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<Feed>> {
        self.store.load_feeds(&FeedScope::user(user_id))
    }

    /// Fetches `url` and stores it with its items. Nothing is stored when
    /// the fetch fails.
    pub async fn subscribe(&self, user_id: &str, url: &str, folder_id: Option<i64>) -> Result<Feed> {
        let url = Url::parse(url.trim())?.to_string();

        if self.store.find_feed_by_url(user_id, &url)?.is_some() {
            return Err(ValidationError::FeedExists(url).into());
        }
        if let Some(folder_id) = folder_id {
            self.usable_folder(user_id, folder_id)?;
        }

        let fetched = match self.updater.fetch_url(&url, &Validators::default()).await? {
            FetchOutcome::Fetched(fetched) => fetched,
            FetchOutcome::NotModified => FetchedFeed::default(),
        };

        let mut feed = Feed::new(user_id, url);
        feed.folder_id = folder_id;
        feed.title = fetched.title.clone();
        feed.id = self.store.add_feed(&feed)?;

        let summary = self.updater.merge(&feed, fetched)?;
        info!(feed = %feed.url, user = %user_id, items = summary.inserted, "subscribed");

        self.find(user_id, feed.id)
    }

    /// Titles are unique among the feeds of one folder.
    pub fn rename(&self, user_id: &str, id: i64, title: &str) -> Result<()> {
        let feed = self.find(user_id, id)?;
        let title = validate_name(title)?;

        let taken = self
            .store
            .feeds_in_folder(user_id, feed.folder_id)?
            .iter()
            .any(|other| other.id != id && other.display_title() == title);
        if taken {
            return Err(ValidationError::TitleExists(title.to_string()).into());
        }

        self.store.rename_feed(id, title)
    }

    pub fn move_to_folder(&self, user_id: &str, id: i64, folder_id: Option<i64>) -> Result<()> {
        self.find(user_id, id)?;
        if let Some(folder_id) = folder_id {
            self.usable_folder(user_id, folder_id)?;
        }
        self.store.move_feed(id, folder_id)
    }

    pub fn mark_deleted(&self, user_id: &str, id: i64) -> Result<()> {
        self.find(user_id, id)?;
        self.store.set_feed_deleted(id, Some(Utc::now()))
    }

    pub fn restore(&self, user_id: &str, id: i64) -> Result<()> {
        self.find(user_id, id)?;
        self.store.set_feed_deleted(id, None)
    }

    /// Checks that fetched items may be merged into the stored feed.
    pub fn validate_for_merge(&self, feed_id: i64, items: &[Item]) -> Result<()> {
        let feed = self
            .store
            .get_feed(feed_id)?
            .ok_or(FeedmillError::FeedNotFound(feed_id))?;
        validate_for_merge(&feed, items)?;
        Ok(())
    }

    /// Removes feeds marked deleted, with their items. With `respect_delay`
    /// only those deleted longer than the purge delay go.
    pub fn purge_deleted(&self, user_id: Option<&str>, respect_delay: bool) -> Result<usize> {
        let before = if respect_delay {
            Utc::now() - self.purge_after
        } else {
            Utc::now() + Duration::seconds(1)
        };
        self.store.purge_deleted_feeds(before, user_id)
    }

    fn usable_folder(&self, user_id: &str, folder_id: i64) -> Result<()> {
        let folder = owned_folder(self.store.as_ref(), user_id, folder_id)?;
        if folder.deleted_at.is_some() {
            return Err(ValidationError::Deleted {
                kind: "folder",
                id: folder_id,
            }
            .into());
        }
        Ok(())
    }
}

pub fn validate_for_merge(feed: &Feed, items: &[Item]) -> std::result::Result<(), ValidationError> {
    if feed.is_deleted() {
        return Err(ValidationError::Deleted {
            kind: "feed",
            id: feed.id,
        });
    }

    if let Some(item) = items.iter().find(|i| i.guid_hash.is_empty()) {
        return Err(ValidationError::MissingFingerprint(item.guid.clone()));
    }

    Ok(())
}

/// Loads a feed, hiding feeds of other users.
pub(crate) fn owned_feed(store: &dyn Store, user_id: &str, id: i64) -> Result<Feed> {
    store
        .get_feed(id)?
        .filter(|f| f.user_id == user_id)
        .ok_or(FeedmillError::FeedNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateConfig;
    use crate::fetcher::FetcherRegistry;
    use crate::service::FolderService;
    use crate::store::SqliteStore;

    struct Fixture {
        feeds: FeedService,
        folders: FolderService,
        store: Arc<SqliteStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let updater = Updater::new(
            store.clone(),
            FetcherRegistry::new(),
            UpdateConfig::default(),
            2,
        );

        Fixture {
            feeds: FeedService::new(store.clone(), updater, Duration::seconds(60)),
            folders: FolderService::new(store.clone(), Duration::seconds(60)),
            store,
        }
    }

    fn add_feed(store: &SqliteStore, user: &str, url: &str, title: &str) -> i64 {
        let mut feed = Feed::new(user, url);
        feed.title = Some(title.into());
        store.add_feed(&feed).unwrap()
    }

    #[test]
    fn test_validate_for_merge() {
        let mut feed = Feed::new("alice", "https://example.com/feed.xml");
        feed.id = 1;

        let mut item = Item::new("a");
        assert!(validate_for_merge(&feed, std::slice::from_ref(&item)).is_ok());

        item.guid_hash.clear();
        assert_eq!(
            validate_for_merge(&feed, &[item]),
            Err(ValidationError::MissingFingerprint("a".into()))
        );

        feed.deleted_at = Some(Utc::now());
        assert!(matches!(
            validate_for_merge(&feed, &[]),
            Err(ValidationError::Deleted { kind: "feed", .. })
        ));
    }

    #[test]
    fn test_validate_for_merge_missing_feed() {
        let f = fixture();
        assert!(matches!(
            f.feeds.validate_for_merge(9, &[]),
            Err(FeedmillError::FeedNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_duplicate_url() {
        let f = fixture();
        add_feed(&f.store, "alice", "https://example.com/feed.xml", "Example");

        let result = f
            .feeds
            .subscribe("alice", " https://example.com/feed.xml ", None)
            .await;
        assert!(matches!(
            result,
            Err(FeedmillError::Validation(ValidationError::FeedExists(_)))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_failure_stores_nothing() {
        let f = fixture();

        let result = f.feeds.subscribe("alice", "https://example.com/rss", None).await;
        assert!(matches!(result, Err(FeedmillError::UnsupportedSource(_))));
        assert!(f.feeds.list("alice").unwrap().is_empty());

        let invalid = f.feeds.subscribe("alice", "not a url", None).await;
        assert!(matches!(invalid, Err(FeedmillError::InvalidUrl(_))));
    }

    #[test]
    fn test_rename_unique_within_folder() {
        let f = fixture();
        let a = add_feed(&f.store, "alice", "https://a.example.com", "A");
        add_feed(&f.store, "alice", "https://b.example.com", "B");

        assert!(matches!(
            f.feeds.rename("alice", a, "B"),
            Err(FeedmillError::Validation(ValidationError::TitleExists(_)))
        ));

        let folder = f.folders.create("alice", "Elsewhere", None).unwrap();
        f.feeds.move_to_folder("alice", a, Some(folder.id)).unwrap();
        f.feeds.rename("alice", a, "B").unwrap();
        assert_eq!(f.feeds.find("alice", a).unwrap().title.as_deref(), Some("B"));
    }

    #[test]
    fn test_move_to_foreign_folder() {
        let f = fixture();
        let feed = add_feed(&f.store, "alice", "https://a.example.com", "A");
        let bobs = f.folders.create("bob", "Bob", None).unwrap();

        assert!(matches!(
            f.feeds.move_to_folder("alice", feed, Some(bobs.id)),
            Err(FeedmillError::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_delete_restore_purge() {
        let f = fixture();
        let feed = add_feed(&f.store, "alice", "https://a.example.com", "A");

        f.feeds.mark_deleted("alice", feed).unwrap();
        assert!(f.feeds.list("alice").unwrap().is_empty());

        f.feeds.restore("alice", feed).unwrap();
        assert_eq!(f.feeds.list("alice").unwrap().len(), 1);

        f.feeds.mark_deleted("alice", feed).unwrap();
        assert_eq!(f.feeds.purge_deleted(None, true).unwrap(), 0);
        assert_eq!(f.feeds.purge_deleted(None, false).unwrap(), 1);
        assert!(f.feeds.find("alice", feed).is_err());
    }

    #[test]
    fn test_foreign_feed_not_found() {
        let f = fixture();
        let feed = add_feed(&f.store, "alice", "https://a.example.com", "A");

        assert!(matches!(
            f.feeds.mark_deleted("bob", feed),
            Err(FeedmillError::FeedNotFound(_))
        ));
    }
}
