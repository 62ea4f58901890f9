use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::StatusFlag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    /// Dedup fingerprint, unique per feed.
    pub guid_hash: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub enclosure_mime: Option<String>,
    pub enclosure_link: Option<String>,
    pub status: StatusFlag,
    pub last_modified: DateTime<Utc>,
}

impl Item {
    /// A fresh, unread item identified by the source-provided guid.
    pub fn new(guid: &str) -> Self {
        Self {
            id: 0,
            feed_id: 0,
            guid: guid.to_string(),
            guid_hash: Self::fingerprint(guid),
            url: None,
            title: None,
            author: None,
            body: None,
            pub_date: None,
            enclosure_mime: None,
            enclosure_link: None,
            status: StatusFlag::UNREAD,
            last_modified: Utc::now(),
        }
    }

    /// An item whose source supplied no guid; identity is derived from what
    /// the source does provide.
    pub fn without_guid(
        title: Option<&str>,
        link: Option<&str>,
        published: Option<DateTime<Utc>>,
    ) -> Self {
        let synthetic = Self::synthetic_guid(title, link, published);
        Self::new(&synthetic)
    }

    pub fn fingerprint(guid: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(guid.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn synthetic_guid(
        title: Option<&str>,
        link: Option<&str>,
        published: Option<DateTime<Utc>>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(link.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        if let Some(published) = published {
            hasher.update(published.timestamp().to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    pub fn is_unread(&self) -> bool {
        self.status.has(StatusFlag::UNREAD)
    }

    pub fn is_starred(&self) -> bool {
        self.status.has(StatusFlag::STARRED)
    }
}
