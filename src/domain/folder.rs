use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    /// Only top-level folders can be parents.
    pub parent_id: Option<i64>,
    pub opened: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Folder {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            name: name.into(),
            parent_id: None,
            opened: true,
            deleted_at: None,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}
