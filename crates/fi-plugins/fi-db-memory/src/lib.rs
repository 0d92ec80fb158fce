//! # fi-db-memory
//!
//! In-process implementation of `PostRepo` and `UserRepo`.
//! Every operation takes one lock over all tables, so each call is atomic
//! with respect to every other call. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fi_core::models::{Image, MarkOutcome, Post, PostFilter, PostState, PurgedPost, User};
use fi_core::traits::{PostRepo, UserRepo};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, Post>,
    /// Insertion-ordered across all posts
    images: Vec<Image>,
}

#[derive(Default)]
pub struct MemoryRepo {
    tables: Mutex<Tables>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repo lock poisoned"))
    }
}

#[async_trait]
impl PostRepo for MemoryRepo {
    async fn create_post(&self, post: Post, images: Vec<Image>) -> anyhow::Result<()> {
        let mut t = self.lock()?;
        if t.posts.contains_key(&post.id) {
            anyhow::bail!("post {} already exists", post.id);
        }
        t.images.extend(images);
        t.posts.insert(post.id, post);
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn list_posts(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>> {
        let t = self.lock()?;
        let mut posts: Vec<Post> = t
            .posts
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn list_images(&self, post_id: Uuid) -> anyhow::Result<Vec<Image>> {
        Ok(self
            .lock()?
            .images
            .iter()
            .filter(|img| img.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn mark_pending_delete(
        &self,
        id: Uuid,
        delete_at: DateTime<Utc>,
    ) -> anyhow::Result<MarkOutcome> {
        let mut t = self.lock()?;
        let Some(post) = t.posts.get_mut(&id) else {
            return Ok(MarkOutcome::Missing);
        };
        match post.state {
            PostState::Active => {
                post.state = PostState::PendingDelete { delete_at };
                Ok(MarkOutcome::Marked)
            }
            PostState::PendingDelete { .. } => Ok(MarkOutcome::AlreadyPending),
        }
    }

    async fn purge_if_pending(&self, id: Uuid) -> anyhow::Result<Option<PurgedPost>> {
        let mut t = self.lock()?;
        let pending = t
            .posts
            .get(&id)
            .is_some_and(|p| p.state.is_pending_delete());
        if !pending {
            return Ok(None);
        }

        let mut filenames = Vec::new();
        t.images.retain(|img| {
            if img.post_id == id {
                filenames.push(img.filename.clone());
                false
            } else {
                true
            }
        });
        t.posts.remove(&id);

        Ok(Some(PurgedPost {
            post_id: id,
            filenames,
        }))
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
        let t = self.lock()?;
        let mut overdue: Vec<(DateTime<Utc>, Uuid)> = t
            .posts
            .values()
            .filter_map(|p| match p.state {
                PostState::PendingDelete { delete_at } if delete_at <= now => {
                    Some((delete_at, p.id))
                }
                _ => None,
            })
            .collect();
        overdue.sort();
        Ok(overdue.into_iter().map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl UserRepo for MemoryRepo {
    async fn create_user(&self, user: User) -> anyhow::Result<bool> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }
        t.users.insert(user.id, user);
        Ok(true)
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}
