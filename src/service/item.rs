use std::sync::Arc;

use crate::app::{FeedmillError, Result};
use crate::domain::{Item, StatusFlag};
use crate::service::feed::owned_feed;
use crate::service::folder::owned_folder;
use crate::store::{ItemQuery, Store};

pub struct ItemService {
    store: Arc<dyn Store>,
}

impl ItemService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn find(&self, user_id: &str, id: i64) -> Result<Item> {
        let item = self
            .store
            .get_item(id)?
            .ok_or(FeedmillError::ItemNotFound(id))?;

        owned_feed(self.store.as_ref(), user_id, item.feed_id)
            .map_err(|_| FeedmillError::ItemNotFound(id))?;

        Ok(item)
    }

    pub fn read(&self, user_id: &str, id: i64, read: bool) -> Result<()> {
        self.find(user_id, id)?;
        if read {
            self.store
                .update_item_status(id, StatusFlag::NONE, StatusFlag::UNREAD)
        } else {
            self.store
                .update_item_status(id, StatusFlag::UNREAD, StatusFlag::NONE)
        }
    }

    pub fn star(&self, user_id: &str, id: i64, starred: bool) -> Result<()> {
        self.find(user_id, id)?;
        self.set_starred(id, starred)
    }

    /// Stars by feed and fingerprint, which survive a purge and re-subscribe
    /// where item ids do not.
    pub fn star_by_guid(
        &self,
        user_id: &str,
        feed_id: i64,
        guid_hash: &str,
        starred: bool,
    ) -> Result<()> {
        owned_feed(self.store.as_ref(), user_id, feed_id)?;

        let item = self
            .store
            .find_item_by_guid_hash(feed_id, guid_hash)?
            .ok_or_else(|| FeedmillError::ItemGuidNotFound {
                feed_id,
                guid_hash: guid_hash.to_string(),
            })?;

        self.set_starred(item.id, starred)
    }

    /// Marks every item up to `newest_item_id` read. Items that arrive after
    /// the client loaded its listing stay unread.
    pub fn read_all(&self, user_id: &str, newest_item_id: i64) -> Result<usize> {
        self.store.mark_all_read(user_id, None, newest_item_id)
    }

    pub fn read_feed(&self, user_id: &str, feed_id: i64, newest_item_id: i64) -> Result<usize> {
        owned_feed(self.store.as_ref(), user_id, feed_id)?;
        self.store
            .mark_all_read(user_id, Some(feed_id), newest_item_id)
    }

    pub fn starred_count(&self, user_id: &str) -> Result<i64> {
        self.store.starred_count(user_id)
    }

    pub fn newest_item_id(&self, user_id: &str) -> Result<Option<i64>> {
        self.store.newest_item_id(user_id)
    }

    pub fn list(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        if let Some(feed_id) = query.feed_id {
            owned_feed(self.store.as_ref(), &query.user_id, feed_id)?;
        }
        if let Some(folder_id) = query.folder_id {
            owned_folder(self.store.as_ref(), &query.user_id, folder_id)?;
        }
        self.store.find_items(query)
    }

    fn set_starred(&self, id: i64, starred: bool) -> Result<()> {
        if starred {
            self.store
                .update_item_status(id, StatusFlag::STARRED, StatusFlag::NONE)
        } else {
            self.store
                .update_item_status(id, StatusFlag::NONE, StatusFlag::STARRED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Feed;
    use crate::store::SqliteStore;

    struct Fixture {
        service: ItemService,
        store: Arc<SqliteStore>,
        feed_id: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let feed_id = store
            .add_feed(&Feed::new("alice", "https://example.com/feed.xml"))
            .unwrap();

        let items: Vec<Item> = ["a", "b", "c"]
            .iter()
            .map(|guid| {
                let mut item = Item::new(guid);
                item.title = Some(guid.to_uppercase());
                item
            })
            .collect();
        store.upsert_items(feed_id, &items).unwrap();

        Fixture {
            service: ItemService::new(store.clone()),
            store,
            feed_id,
        }
    }

    fn item_id(fixture: &Fixture, guid: &str) -> i64 {
        fixture
            .store
            .find_item_by_guid_hash(fixture.feed_id, &Item::fingerprint(guid))
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn test_read_and_unread() {
        let f = fixture();
        let id = item_id(&f, "a");

        f.service.read("alice", id, true).unwrap();
        assert!(!f.service.find("alice", id).unwrap().is_unread());

        f.service.read("alice", id, false).unwrap();
        assert!(f.service.find("alice", id).unwrap().is_unread());
    }

    #[test]
    fn test_star_and_count() {
        let f = fixture();
        f.service.star("alice", item_id(&f, "a"), true).unwrap();
        f.service
            .star_by_guid("alice", f.feed_id, &Item::fingerprint("b"), true)
            .unwrap();
        assert_eq!(f.service.starred_count("alice").unwrap(), 2);

        f.service.star("alice", item_id(&f, "a"), false).unwrap();
        assert_eq!(f.service.starred_count("alice").unwrap(), 1);
    }

    #[test]
    fn test_star_unknown_guid_is_not_found() {
        let f = fixture();
        let result = f
            .service
            .star_by_guid("alice", f.feed_id, &Item::fingerprint("zzz"), true);

        assert!(matches!(
            result,
            Err(FeedmillError::ItemGuidNotFound { feed_id, .. }) if feed_id == f.feed_id
        ));
        assert_eq!(f.service.starred_count("alice").unwrap(), 0);
    }

    #[test]
    fn test_other_users_items_are_not_found() {
        let f = fixture();
        let id = item_id(&f, "a");

        assert!(matches!(
            f.service.read("bob", id, true),
            Err(FeedmillError::ItemNotFound(_))
        ));
        assert!(matches!(
            f.service.read_feed("bob", f.feed_id, i64::MAX),
            Err(FeedmillError::FeedNotFound(_))
        ));
    }

    #[test]
    fn test_read_all_stops_at_newest_id() {
        let f = fixture();
        let newest = item_id(&f, "b");

        let marked = f.service.read_all("alice", newest).unwrap();
        assert_eq!(marked, 2);
        assert!(f.service.find("alice", item_id(&f, "c")).unwrap().is_unread());
        assert_eq!(
            f.service.newest_item_id("alice").unwrap(),
            Some(item_id(&f, "c"))
        );
    }

    #[test]
    fn test_list_hides_read_unless_show_all() {
        let f = fixture();
        f.service.read("alice", item_id(&f, "a"), true).unwrap();

        let mut query = ItemQuery {
            user_id: "alice".into(),
            feed_id: Some(f.feed_id),
            ..Default::default()
        };
        assert_eq!(f.service.list(&query).unwrap().len(), 2);

        query.show_all = true;
        assert_eq!(f.service.list(&query).unwrap().len(), 3);

        query.user_id = "bob".into();
        assert!(f.service.list(&query).is_err());
    }
}
