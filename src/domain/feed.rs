use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub user_id: String,
    pub url: String,
    pub folder_id: Option<i64>,
    pub title: Option<String>,
    /// Website the feed belongs to, as announced by the feed document.
    pub link: Option<String>,
    pub favicon_link: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub failure_count: i64,
    pub needs_attention: bool,
    pub last_error: Option<String>,
    pub ordering: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(user_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            url: url.into(),
            folder_id: None,
            title: None,
            link: None,
            favicon_link: None,
            etag: None,
            last_modified: None,
            last_fetched_at: None,
            failure_count: 0,
            needs_attention: false,
            last_error: None,
            ordering: 0,
            deleted_at: None,
            added_at: Utc::now(),
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}

/// Conditional-fetch cache validators remembered from the last response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Metadata written back after a successful fetch. `None` leaves a column
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub link: Option<String>,
    pub favicon_link: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Resets the failure counter, attention flag and last error.
    pub reset_failures: bool,
}

/// Selects the feeds an update run touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedScope {
    pub user_id: Option<String>,
    pub feed_id: Option<i64>,
}

impl FeedScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            feed_id: None,
        }
    }

    pub fn feed(feed_id: i64) -> Self {
        Self {
            user_id: None,
            feed_id: Some(feed_id),
        }
    }

    pub fn is_all(&self) -> bool {
        self.user_id.is_none() && self.feed_id.is_none()
    }

    pub fn matches(&self, feed: &Feed) -> bool {
        self.user_id.as_deref().is_none_or(|u| u == feed.user_id)
            && self.feed_id.is_none_or(|id| id == feed.id)
    }
}
