use thiserror::Error;

use crate::config::ConfigError;
use crate::service::ValidationError;

#[derive(Error, Debug)]
pub enum FeedmillError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Feed format error: {0}")]
    FeedFormat(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed not found: {0}")]
    FeedNotFound(i64),

    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    #[error("Item {guid_hash} not found in feed {feed_id}")]
    ItemGuidNotFound { feed_id: i64, guid_hash: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl FeedmillError {
    /// Failures that belong to a single feed fetch and are recorded on the
    /// feed instead of aborting the caller.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            FeedmillError::Network(_)
                | FeedmillError::UnsupportedSource(_)
                | FeedmillError::FeedFormat(_)
                | FeedmillError::Unauthorized(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FeedmillError>;
