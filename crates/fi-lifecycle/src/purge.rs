//! Guarded purge shared by the scheduler and the sweeper.

use std::sync::Arc;

use fi_core::traits::{ImageStore, PostRepo};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// The post and its image rows are gone. `files_failed` counts backing
    /// files that could not be removed and are now orphaned.
    Purged { files_removed: usize, files_failed: usize },
    /// The post was already gone or is not pending deletion.
    NothingToDo,
}

#[derive(Clone)]
pub struct Purger {
    posts: Arc<dyn PostRepo>,
    images: Arc<dyn ImageStore>,
}

impl Purger {
    pub fn new(posts: Arc<dyn PostRepo>, images: Arc<dyn ImageStore>) -> Self {
        Self { posts, images }
    }

    /// Removes the post record and image rows if, and only if, the post is
    /// still `pending_delete`, then deletes the backing files best-effort.
    ///
    /// Records go first: a file is never removed while its row still exists.
    /// Errors only come from storage; file failures are logged and counted.
    pub async fn purge(&self, post_id: Uuid) -> anyhow::Result<PurgeOutcome> {
        let Some(purged) = self.posts.purge_if_pending(post_id).await? else {
            log::debug!("purge of post {post_id} skipped: not pending deletion");
            return Ok(PurgeOutcome::NothingToDo);
        };

        let mut files_removed = 0;
        let mut files_failed = 0;
        for filename in &purged.filenames {
            match self.images.delete_image(filename).await {
                Ok(()) => files_removed += 1,
                Err(e) => {
                    log::warn!("post {post_id}: {e}");
                    files_failed += 1;
                }
            }
        }

        log::info!(
            "purged post {post_id} ({files_removed} files removed, {files_failed} orphaned)"
        );
        Ok(PurgeOutcome::Purged {
            files_removed,
            files_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pending_post, seed_post};
    use fi_core::error::FileDeleteFailure;
    use fi_core::traits::{MockImageStore, MockPostRepo};
    use fi_db_memory::MemoryRepo;

    fn ok_store() -> MockImageStore {
        let mut store = MockImageStore::new();
        store.expect_delete_image().returning(|_| Ok(()));
        store
    }

    #[tokio::test]
    async fn test_concurrent_purges_run_once() {
        let repo = Arc::new(MemoryRepo::new());
        let id = pending_post(&repo, &["a.png", "b.png"]).await;
        let purger = Purger::new(repo.clone(), Arc::new(ok_store()));

        let (a, b) = tokio::join!(purger.purge(id), purger.purge(id));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, PurgeOutcome::NothingToDo));

        assert_eq!(
            outcomes,
            vec![
                PurgeOutcome::Purged {
                    files_removed: 2,
                    files_failed: 0
                },
                PurgeOutcome::NothingToDo,
            ]
        );
        assert!(repo.get_post(id).await.unwrap().is_none());
        assert!(repo.list_images(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_post_is_left_alone() {
        let repo = Arc::new(MemoryRepo::new());
        let id = seed_post(&repo, uuid::Uuid::now_v7(), &["keep.png"]).await;

        let mut store = MockImageStore::new();
        store.expect_delete_image().never();
        let purger = Purger::new(repo.clone(), Arc::new(store));

        assert_eq!(purger.purge(id).await.unwrap(), PurgeOutcome::NothingToDo);
        assert!(repo.get_post(id).await.unwrap().is_some());
        assert_eq!(repo.list_images(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_failures_do_not_block_record_purge() {
        let repo = Arc::new(MemoryRepo::new());
        let id = pending_post(&repo, &["gone.png", "locked.png"]).await;

        let mut store = MockImageStore::new();
        store.expect_delete_image().returning(|name| {
            if name == "locked.png" {
                Err(FileDeleteFailure {
                    filename: name.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                })
            } else {
                Ok(())
            }
        });
        let purger = Purger::new(repo.clone(), Arc::new(store));

        assert_eq!(
            purger.purge(id).await.unwrap(),
            PurgeOutcome::Purged {
                files_removed: 1,
                files_failed: 1
            }
        );
        assert!(repo.get_post(id).await.unwrap().is_none());
        assert!(repo.list_images(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned_and_touches_no_files() {
        let mut posts = MockPostRepo::new();
        posts
            .expect_purge_if_pending()
            .returning(|_| Err(anyhow::anyhow!("database is locked")));
        let mut store = MockImageStore::new();
        store.expect_delete_image().never();

        let purger = Purger::new(Arc::new(posts), Arc::new(store));
        assert!(purger.purge(uuid::Uuid::now_v7()).await.is_err());
    }
}
