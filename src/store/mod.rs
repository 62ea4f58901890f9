pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Feed, FeedScope, FeedUpdate, Folder, Item, StatusFlag};

pub use sqlite::SqliteStore;

/// Counts produced by merging one feed's fetched items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Item listing filter.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub user_id: String,
    pub feed_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub starred_only: bool,
    pub show_all: bool,
    /// Only items with an id lower than this one (paging).
    pub before_id: Option<i64>,
    pub limit: Option<usize>,
}

pub trait Store: Send + Sync {
    // Folder operations
    fn add_folder(&self, folder: &Folder) -> Result<i64>;
    fn get_folder(&self, id: i64) -> Result<Option<Folder>>;
    fn folders_by_user(&self, user_id: &str) -> Result<Vec<Folder>>;
    fn find_folder_by_name(
        &self,
        user_id: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Option<Folder>>;
    fn rename_folder(&self, id: i64, name: &str) -> Result<()>;
    fn set_folder_opened(&self, id: i64, opened: bool) -> Result<()>;
    fn set_folder_deleted(&self, id: i64, deleted_at: Option<DateTime<Utc>>) -> Result<()>;
    fn purge_deleted_folders(&self, before: DateTime<Utc>, user_id: Option<&str>)
        -> Result<usize>;

    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn find_feed_by_url(&self, user_id: &str, url: &str) -> Result<Option<Feed>>;
    /// Non-deleted feeds matching the scope, ordered by priority then title.
    fn load_feeds(&self, scope: &FeedScope) -> Result<Vec<Feed>>;
    fn feeds_in_folder(&self, user_id: &str, folder_id: Option<i64>) -> Result<Vec<Feed>>;
    fn update_feed_metadata(&self, id: i64, update: &FeedUpdate) -> Result<()>;
    /// Bumps the failure counter and flags the feed once it reaches
    /// `max_failures`. Returns the feed as stored afterwards.
    fn record_fetch_failure(&self, id: i64, error: &str, max_failures: i64) -> Result<Feed>;
    fn rename_feed(&self, id: i64, title: &str) -> Result<()>;
    fn move_feed(&self, id: i64, folder_id: Option<i64>) -> Result<()>;
    fn set_feed_deleted(&self, id: i64, deleted_at: Option<DateTime<Utc>>) -> Result<()>;
    fn purge_deleted_feeds(&self, before: DateTime<Utc>, user_id: Option<&str>) -> Result<usize>;

    // Item operations
    /// Inserts new items and refreshes the content of known ones, keyed by
    /// `(feed_id, guid_hash)`, in one transaction. Status bits of existing
    /// rows are left alone.
    fn upsert_items(&self, feed_id: i64, items: &[Item]) -> Result<MergeStats>;
    fn get_item(&self, id: i64) -> Result<Option<Item>>;
    fn find_item_by_guid_hash(&self, feed_id: i64, guid_hash: &str) -> Result<Option<Item>>;
    fn items_by_feed(&self, feed_id: i64) -> Result<Vec<Item>>;
    fn find_items(&self, query: &ItemQuery) -> Result<Vec<Item>>;
    fn update_item_status(&self, id: i64, set: StatusFlag, clear: StatusFlag) -> Result<()>;
    /// Marks every item of the user up to `newest_id` read. Returns rows touched.
    fn mark_all_read(&self, user_id: &str, feed_id: Option<i64>, newest_id: i64)
        -> Result<usize>;
    /// Deletes read, non-starred items of the feed beyond the `keep` newest
    /// by publish time. Returns rows deleted.
    fn delete_items_older_than(&self, feed_id: i64, keep: usize) -> Result<usize>;
    fn unread_count(&self, feed_id: i64) -> Result<i64>;
    fn starred_count(&self, user_id: &str) -> Result<i64>;
    fn newest_item_id(&self, user_id: &str) -> Result<Option<i64>>;
}
