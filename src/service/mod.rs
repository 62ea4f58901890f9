//! Business rules applied before anything reaches the store.
//!
//! Ownership is checked on every call: a folder, feed or item belonging to
//! another user is reported as not found.

pub mod feed;
pub mod folder;
pub mod item;

pub use feed::{validate_for_merge, FeedService};
pub use folder::FolderService;
pub use item::ItemService;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("A folder named {0:?} already exists here")]
    FolderExists(String),

    #[error("A feed titled {0:?} already exists in this folder")]
    TitleExists(String),

    #[error("Already subscribed to {0}")]
    FeedExists(String),

    #[error("Folder {0} is not top-level and cannot contain folders")]
    FolderTooDeep(i64),

    #[error("{kind} {id} is deleted")]
    Deleted { kind: &'static str, id: i64 },

    #[error("Item {0:?} has no fingerprint")]
    MissingFingerprint(String),
}

/// Trimmed, non-empty display name.
pub(crate) fn validate_name(name: &str) -> Result<&str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name)
}
