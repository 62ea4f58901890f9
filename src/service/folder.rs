use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::app::{FeedmillError, Result};
use crate::domain::Folder;
use crate::service::{validate_name, ValidationError};
use crate::store::Store;

pub struct FolderService {
    store: Arc<dyn Store>,
    purge_after: Duration,
}

impl FolderService {
    pub fn new(store: Arc<dyn Store>, purge_after: Duration) -> Self {
        Self { store, purge_after }
    }

    pub fn find(&self, user_id: &str, id: i64) -> Result<Folder> {
        owned_folder(self.store.as_ref(), user_id, id)
    }

    /// Folders not marked deleted.
    pub fn list(&self, user_id: &str) -> Result<Vec<Folder>> {
        let folders = self.store.folders_by_user(user_id)?;
        Ok(folders.into_iter().filter(|f| f.deleted_at.is_none()).collect())
    }

    pub fn create(&self, user_id: &str, name: &str, parent_id: Option<i64>) -> Result<Folder> {
        let name = validate_name(name)?;

        if let Some(parent_id) = parent_id {
            let parent = self.find(user_id, parent_id)?;
            if !parent.is_top_level() {
                return Err(ValidationError::FolderTooDeep(parent_id).into());
            }
            if parent.deleted_at.is_some() {
                return Err(ValidationError::Deleted {
                    kind: "folder",
                    id: parent_id,
                }
                .into());
            }
        }

        self.ensure_unique(user_id, name, parent_id, None)?;

        let mut folder = Folder::new(user_id, name);
        folder.parent_id = parent_id;
        folder.id = self.store.add_folder(&folder)?;
        Ok(folder)
    }

    pub fn rename(&self, user_id: &str, id: i64, name: &str) -> Result<()> {
        let folder = self.find(user_id, id)?;
        let name = validate_name(name)?;

        self.ensure_unique(user_id, name, folder.parent_id, Some(id))?;
        self.store.rename_folder(id, name)
    }

    pub fn mark_deleted(&self, user_id: &str, id: i64) -> Result<()> {
        self.find(user_id, id)?;
        self.store.set_folder_deleted(id, Some(Utc::now()))
    }

    pub fn restore(&self, user_id: &str, id: i64) -> Result<()> {
        self.find(user_id, id)?;
        self.store.set_folder_deleted(id, None)
    }

    pub fn set_opened(&self, user_id: &str, id: i64, opened: bool) -> Result<()> {
        self.find(user_id, id)?;
        self.store.set_folder_opened(id, opened)
    }

    /// Removes folders marked deleted, with their feeds and items. With
    /// `respect_delay` only those deleted longer than the purge delay go.
    pub fn purge_deleted(&self, user_id: Option<&str>, respect_delay: bool) -> Result<usize> {
        let before = if respect_delay {
            Utc::now() - self.purge_after
        } else {
            Utc::now() + Duration::seconds(1)
        };
        self.store.purge_deleted_folders(before, user_id)
    }

    fn ensure_unique(
        &self,
        user_id: &str,
        name: &str,
        parent_id: Option<i64>,
        except: Option<i64>,
    ) -> Result<()> {
        match self.store.find_folder_by_name(user_id, name, parent_id)? {
            Some(existing) if Some(existing.id) != except => {
                Err(ValidationError::FolderExists(name.to_string()).into())
            }
            _ => Ok(()),
        }
    }
}

/// Loads a folder, hiding folders of other users.
pub(crate) fn owned_folder(store: &dyn Store, user_id: &str, id: i64) -> Result<Folder> {
    store
        .get_folder(id)?
        .filter(|f| f.user_id == user_id)
        .ok_or(FeedmillError::FolderNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn service() -> FolderService {
        FolderService::new(Arc::new(SqliteStore::in_memory().unwrap()), Duration::seconds(60))
    }

    #[test]
    fn test_create_and_list() {
        let service = service();
        let folder = service.create("alice", "  News ", None).unwrap();

        assert_eq!(folder.name, "News");
        assert!(folder.opened);
        assert_eq!(service.list("alice").unwrap().len(), 1);
        assert!(service.list("bob").unwrap().is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = service().create("alice", "   ", None);
        assert!(matches!(
            result,
            Err(FeedmillError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn test_sibling_names_unique() {
        let service = service();
        let parent = service.create("alice", "Tech", None).unwrap();
        service.create("alice", "Rust", Some(parent.id)).unwrap();

        let duplicate = service.create("alice", "Rust", Some(parent.id));
        assert!(matches!(
            duplicate,
            Err(FeedmillError::Validation(ValidationError::FolderExists(_)))
        ));

        service.create("alice", "Rust", None).unwrap();
        service.create("bob", "Tech", None).unwrap();
    }

    #[test]
    fn test_only_top_level_parents() {
        let service = service();
        let top = service.create("alice", "Tech", None).unwrap();
        let child = service.create("alice", "Rust", Some(top.id)).unwrap();

        let result = service.create("alice", "Async", Some(child.id));
        assert!(matches!(
            result,
            Err(FeedmillError::Validation(ValidationError::FolderTooDeep(_)))
        ));
    }

    #[test]
    fn test_foreign_parent_not_found() {
        let service = service();
        let bobs = service.create("bob", "Private", None).unwrap();

        let result = service.create("alice", "Mine", Some(bobs.id));
        assert!(matches!(result, Err(FeedmillError::FolderNotFound(_))));
    }

    #[test]
    fn test_rename_conflict_and_self_rename() {
        let service = service();
        let news = service.create("alice", "News", None).unwrap();
        service.create("alice", "Blogs", None).unwrap();

        service.rename("alice", news.id, "News").unwrap();
        let result = service.rename("alice", news.id, "Blogs");
        assert!(matches!(
            result,
            Err(FeedmillError::Validation(ValidationError::FolderExists(_)))
        ));

        service.rename("alice", news.id, "Headlines").unwrap();
        assert_eq!(service.find("alice", news.id).unwrap().name, "Headlines");
    }

    #[test]
    fn test_soft_delete_restore_and_purge() {
        let service = service();
        let folder = service.create("alice", "Old", None).unwrap();

        service.mark_deleted("alice", folder.id).unwrap();
        assert!(service.list("alice").unwrap().is_empty());
        assert_eq!(service.purge_deleted(Some("alice"), true).unwrap(), 0);

        service.restore("alice", folder.id).unwrap();
        assert_eq!(service.list("alice").unwrap().len(), 1);

        service.mark_deleted("alice", folder.id).unwrap();
        assert_eq!(service.purge_deleted(Some("alice"), false).unwrap(), 1);
        assert!(matches!(
            service.find("alice", folder.id),
            Err(FeedmillError::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_set_opened() {
        let service = service();
        let folder = service.create("alice", "News", None).unwrap();

        service.set_opened("alice", folder.id, false).unwrap();
        assert!(!service.find("alice", folder.id).unwrap().opened);
        assert!(service.set_opened("bob", folder.id, true).is_err());
    }
}
