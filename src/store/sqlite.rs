use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{FeedmillError, Result};
use crate::domain::{Feed, FeedScope, FeedUpdate, Folder, Item, StatusFlag};
use crate::store::{ItemQuery, MergeStats, Store};

const FOLDER_COLUMNS: &str = "id, user_id, name, parent_id, opened, deleted_at";

const FEED_COLUMNS: &str = "id, user_id, url, folder_id, title, link, favicon_link, etag, \
     last_modified, last_fetched_at, failure_count, needs_attention, last_error, ordering, \
     deleted_at, added_at";

const ITEM_COLUMNS: &str = "i.id, i.feed_id, i.guid, i.guid_hash, i.url, i.title, i.author, \
     i.body, i.pub_date, i.enclosure_mime, i.enclosure_link, i.status, i.last_modified";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FeedmillError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FeedmillError::Other(format!("Store lock poisoned: {}", e)))
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    /// Timestamps are stored with a fixed width so text comparison orders them.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn folder_from_row(row: &Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            parent_id: row.get(3)?,
            opened: row.get(4)?,
            deleted_at: row
                .get::<_, Option<String>>(5)?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            user_id: row.get(1)?,
            url: row.get(2)?,
            folder_id: row.get(3)?,
            title: row.get(4)?,
            link: row.get(5)?,
            favicon_link: row.get(6)?,
            etag: row.get(7)?,
            last_modified: row.get(8)?,
            last_fetched_at: row
                .get::<_, Option<String>>(9)?
                .and_then(|s| Self::parse_datetime(&s)),
            failure_count: row.get(10)?,
            needs_attention: row.get(11)?,
            last_error: row.get(12)?,
            ordering: row.get(13)?,
            deleted_at: row
                .get::<_, Option<String>>(14)?
                .and_then(|s| Self::parse_datetime(&s)),
            added_at: row
                .get::<_, String>(15)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            guid: row.get(2)?,
            guid_hash: row.get(3)?,
            url: row.get(4)?,
            title: row.get(5)?,
            author: row.get(6)?,
            body: row.get(7)?,
            pub_date: row
                .get::<_, Option<i64>>(8)?
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            enclosure_mime: row.get(9)?,
            enclosure_link: row.get(10)?,
            status: StatusFlag::from_bits(row.get(11)?),
            last_modified: row
                .get::<_, String>(12)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn query_feed(conn: &Connection, id: i64) -> Result<Option<Feed>> {
        let feed = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;
        Ok(feed)
    }

    fn to_sql_count(n: usize) -> i64 {
        i64::try_from(n).unwrap_or(i64::MAX)
    }
}

impl Store for SqliteStore {
    fn add_folder(&self, folder: &Folder) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO folders (user_id, name, parent_id, opened) VALUES (?1, ?2, ?3, ?4)",
            params![folder.user_id, folder.name, folder.parent_id, folder.opened],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_folder(&self, id: i64) -> Result<Option<Folder>> {
        let conn = self.conn()?;

        let folder = conn
            .query_row(
                &format!("SELECT {} FROM folders WHERE id = ?1", FOLDER_COLUMNS),
                params![id],
                Self::folder_from_row,
            )
            .optional()?;

        Ok(folder)
    }

    fn folders_by_user(&self, user_id: &str) -> Result<Vec<Folder>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM folders WHERE user_id = ?1 ORDER BY name",
            FOLDER_COLUMNS
        ))?;

        let folders = stmt
            .query_map(params![user_id], Self::folder_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(folders)
    }

    fn find_folder_by_name(
        &self,
        user_id: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Option<Folder>> {
        let conn = self.conn()?;

        let folder = conn
            .query_row(
                &format!(
                    "SELECT {} FROM folders
                     WHERE user_id = ?1 AND name = ?2 AND parent_id IS ?3 AND deleted_at IS NULL",
                    FOLDER_COLUMNS
                ),
                params![user_id, name, parent_id],
                Self::folder_from_row,
            )
            .optional()?;

        Ok(folder)
    }

    fn rename_folder(&self, id: i64, name: &str) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE folders SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FolderNotFound(id));
        }

        Ok(())
    }

    fn set_folder_opened(&self, id: i64, opened: bool) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE folders SET opened = ?1 WHERE id = ?2",
            params![opened, id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FolderNotFound(id));
        }

        Ok(())
    }

    fn set_folder_deleted(&self, id: i64, deleted_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE folders SET deleted_at = ?1 WHERE id = ?2",
            params![deleted_at.as_ref().map(Self::format_datetime), id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FolderNotFound(id));
        }

        Ok(())
    }

    fn purge_deleted_folders(
        &self,
        before: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<usize> {
        let conn = self.conn()?;

        let purged = conn.execute(
            "DELETE FROM folders
             WHERE deleted_at IS NOT NULL AND deleted_at < ?1 AND (?2 IS NULL OR user_id = ?2)",
            params![Self::format_datetime(&before), user_id],
        )?;

        Ok(purged)
    }

    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (user_id, url, folder_id, title, link, favicon_link, ordering, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                feed.user_id,
                feed.url,
                feed.folder_id,
                feed.title,
                feed.link,
                feed.favicon_link,
                feed.ordering,
                Self::format_datetime(&feed.added_at)
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        Self::query_feed(&conn, id)
    }

    fn find_feed_by_url(&self, user_id: &str, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let feed = conn
            .query_row(
                &format!(
                    "SELECT {} FROM feeds WHERE user_id = ?1 AND url = ?2",
                    FEED_COLUMNS
                ),
                params![user_id, url],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(feed)
    }

    fn load_feeds(&self, scope: &FeedScope) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM feeds WHERE deleted_at IS NULL",
            FEED_COLUMNS
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(user_id) = &scope.user_id {
            values.push(Value::Text(user_id.clone()));
            sql.push_str(&format!(" AND user_id = ?{}", values.len()));
        }
        if let Some(feed_id) = scope.feed_id {
            values.push(Value::Integer(feed_id));
            sql.push_str(&format!(" AND id = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY ordering DESC, title, url");

        let mut stmt = conn.prepare(&sql)?;
        let feeds = stmt
            .query_map(params_from_iter(values.iter()), Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn feeds_in_folder(&self, user_id: &str, folder_id: Option<i64>) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds
             WHERE user_id = ?1 AND folder_id IS ?2 AND deleted_at IS NULL
             ORDER BY ordering DESC, title, url",
            FEED_COLUMNS
        ))?;

        let feeds = stmt
            .query_map(params![user_id, folder_id], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn update_feed_metadata(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE feeds SET
                title = COALESCE(?1, title),
                link = COALESCE(?2, link),
                favicon_link = COALESCE(?3, favicon_link),
                etag = COALESCE(?4, etag),
                last_modified = COALESCE(?5, last_modified),
                last_fetched_at = COALESCE(?6, last_fetched_at)
             WHERE id = ?7",
            params![
                update.title,
                update.link,
                update.favicon_link,
                update.etag,
                update.last_modified,
                update.last_fetched_at.as_ref().map(Self::format_datetime),
                id
            ],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FeedNotFound(id));
        }

        if update.reset_failures {
            conn.execute(
                "UPDATE feeds SET failure_count = 0, needs_attention = 0, last_error = NULL
                 WHERE id = ?1",
                params![id],
            )?;
        }

        Ok(())
    }

    fn record_fetch_failure(&self, id: i64, error: &str, max_failures: i64) -> Result<Feed> {
        let conn = self.conn()?;

        // Right-hand sides see the pre-update row.
        conn.execute(
            "UPDATE feeds SET
                failure_count = failure_count + 1,
                last_error = ?2,
                last_fetched_at = ?3,
                needs_attention = CASE WHEN failure_count + 1 >= ?4 THEN 1 ELSE needs_attention END
             WHERE id = ?1",
            params![id, error, Self::format_datetime(&Utc::now()), max_failures],
        )?;

        Self::query_feed(&conn, id)?.ok_or(FeedmillError::FeedNotFound(id))
    }

    fn rename_feed(&self, id: i64, title: &str) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE feeds SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FeedNotFound(id));
        }

        Ok(())
    }

    fn move_feed(&self, id: i64, folder_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE feeds SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FeedNotFound(id));
        }

        Ok(())
    }

    fn set_feed_deleted(&self, id: i64, deleted_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE feeds SET deleted_at = ?1 WHERE id = ?2",
            params![deleted_at.as_ref().map(Self::format_datetime), id],
        )?;
        if changed == 0 {
            return Err(FeedmillError::FeedNotFound(id));
        }

        Ok(())
    }

    fn purge_deleted_feeds(&self, before: DateTime<Utc>, user_id: Option<&str>) -> Result<usize> {
        let conn = self.conn()?;

        let purged = conn.execute(
            "DELETE FROM feeds
             WHERE deleted_at IS NOT NULL AND deleted_at < ?1 AND (?2 IS NULL OR user_id = ?2)",
            params![Self::format_datetime(&before), user_id],
        )?;

        Ok(purged)
    }

    fn upsert_items(&self, feed_id: i64, items: &[Item]) -> Result<MergeStats> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let mut stats = MergeStats::default();

        for item in items {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM items WHERE feed_id = ?1 AND guid_hash = ?2",
                    params![feed_id, item.guid_hash],
                    |row| row.get(0),
                )
                .optional()?;

            let pub_date = item.pub_date.map(|dt| dt.timestamp());
            let last_modified = Self::format_datetime(&item.last_modified);

            match existing {
                Some(id) => {
                    // Only rows whose content differs are touched; status stays.
                    let changed = tx.execute(
                        "UPDATE items SET
                            guid = ?2, url = ?3, title = ?4, author = ?5, body = ?6,
                            pub_date = ?7, enclosure_mime = ?8, enclosure_link = ?9,
                            last_modified = ?10
                         WHERE id = ?1 AND (
                            url IS NOT ?3 OR title IS NOT ?4 OR author IS NOT ?5
                            OR body IS NOT ?6 OR pub_date IS NOT ?7
                            OR enclosure_mime IS NOT ?8 OR enclosure_link IS NOT ?9)",
                        params![
                            id,
                            item.guid,
                            item.url,
                            item.title,
                            item.author,
                            item.body,
                            pub_date,
                            item.enclosure_mime,
                            item.enclosure_link,
                            last_modified
                        ],
                    )?;
                    stats.updated += changed;
                }
                None => {
                    tx.execute(
                        "INSERT INTO items (feed_id, guid, guid_hash, url, title, author, body,
                            pub_date, enclosure_mime, enclosure_link, status, last_modified)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            feed_id,
                            item.guid,
                            item.guid_hash,
                            item.url,
                            item.title,
                            item.author,
                            item.body,
                            pub_date,
                            item.enclosure_mime,
                            item.enclosure_link,
                            item.status.bits(),
                            last_modified
                        ],
                    )?;
                    stats.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn()?;

        let item = conn
            .query_row(
                &format!("SELECT {} FROM items i WHERE i.id = ?1", ITEM_COLUMNS),
                params![id],
                Self::item_from_row,
            )
            .optional()?;

        Ok(item)
    }

    fn find_item_by_guid_hash(&self, feed_id: i64, guid_hash: &str) -> Result<Option<Item>> {
        let conn = self.conn()?;

        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM items i WHERE i.feed_id = ?1 AND i.guid_hash = ?2",
                    ITEM_COLUMNS
                ),
                params![feed_id, guid_hash],
                Self::item_from_row,
            )
            .optional()?;

        Ok(item)
    }

    fn items_by_feed(&self, feed_id: i64) -> Result<Vec<Item>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items i WHERE i.feed_id = ?1 ORDER BY i.pub_date DESC, i.id DESC",
            ITEM_COLUMNS
        ))?;

        let items = stmt
            .query_map(params![feed_id], Self::item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn find_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let conn = self.conn()?;

        let (mask, expected) = if query.starred_only {
            (StatusFlag::DELETED | StatusFlag::STARRED, StatusFlag::STARRED)
        } else {
            StatusFlag::filter(query.show_all)
        };

        let mut sql = format!(
            "SELECT {} FROM items i JOIN feeds f ON f.id = i.feed_id
             WHERE f.user_id = ?1 AND f.deleted_at IS NULL AND (i.status & ?2) = ?3",
            ITEM_COLUMNS
        );
        let mut values = vec![
            Value::Text(query.user_id.clone()),
            Value::Integer(mask.bits()),
            Value::Integer(expected.bits()),
        ];

        if let Some(feed_id) = query.feed_id {
            values.push(Value::Integer(feed_id));
            sql.push_str(&format!(" AND i.feed_id = ?{}", values.len()));
        }
        if let Some(folder_id) = query.folder_id {
            values.push(Value::Integer(folder_id));
            sql.push_str(&format!(" AND f.folder_id = ?{}", values.len()));
        }
        if let Some(before_id) = query.before_id {
            values.push(Value::Integer(before_id));
            sql.push_str(&format!(" AND i.id < ?{}", values.len()));
        }
        sql.push_str(" ORDER BY i.id DESC");
        if let Some(limit) = query.limit {
            values.push(Value::Integer(Self::to_sql_count(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), Self::item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn update_item_status(&self, id: i64, set: StatusFlag, clear: StatusFlag) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE items SET status = (status | ?1) & ?2, last_modified = ?3 WHERE id = ?4",
            params![
                set.bits(),
                !clear.bits(),
                Self::format_datetime(&Utc::now()),
                id
            ],
        )?;
        if changed == 0 {
            return Err(FeedmillError::ItemNotFound(id));
        }

        Ok(())
    }

    fn mark_all_read(
        &self,
        user_id: &str,
        feed_id: Option<i64>,
        newest_id: i64,
    ) -> Result<usize> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE items SET status = status & ?1, last_modified = ?2
             WHERE id <= ?3 AND (status & ?4) != 0
               AND feed_id IN (
                 SELECT id FROM feeds WHERE user_id = ?5 AND (?6 IS NULL OR id = ?6)
               )",
            params![
                !StatusFlag::UNREAD.bits(),
                Self::format_datetime(&Utc::now()),
                newest_id,
                StatusFlag::UNREAD.bits(),
                user_id,
                feed_id
            ],
        )?;

        Ok(changed)
    }

    fn delete_items_older_than(&self, feed_id: i64, keep: usize) -> Result<usize> {
        let conn = self.conn()?;
        let protected = (StatusFlag::UNREAD | StatusFlag::STARRED).bits();

        let deleted = conn.execute(
            "DELETE FROM items
             WHERE feed_id = ?1 AND (status & ?2) = 0 AND id NOT IN (
                 SELECT id FROM items
                 WHERE feed_id = ?1 AND (status & ?2) = 0
                 ORDER BY pub_date DESC, id DESC
                 LIMIT ?3
             )",
            params![feed_id, protected, Self::to_sql_count(keep)],
        )?;

        Ok(deleted)
    }

    fn unread_count(&self, feed_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let mask = (StatusFlag::UNREAD | StatusFlag::DELETED).bits();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE feed_id = ?1 AND (status & ?2) = ?3",
            params![feed_id, mask, StatusFlag::UNREAD.bits()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn starred_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let mask = (StatusFlag::STARRED | StatusFlag::DELETED).bits();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items i JOIN feeds f ON f.id = i.feed_id
             WHERE f.user_id = ?1 AND f.deleted_at IS NULL AND (i.status & ?2) = ?3",
            params![user_id, mask, StatusFlag::STARRED.bits()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn newest_item_id(&self, user_id: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;

        let newest: Option<i64> = conn.query_row(
            "SELECT MAX(i.id) FROM items i JOIN feeds f ON f.id = i.feed_id WHERE f.user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(newest)
    }
}
