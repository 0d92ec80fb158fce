//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::FileDeleteFailure;
use crate::models::{Image, MarkOutcome, Post, PostFilter, PurgedPost, User};

/// Persistence contract for posts and their image rows.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts a post together with its image rows in one transaction.
    async fn create_post(&self, post: Post, images: Vec<Image>) -> anyhow::Result<()>;
    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// Newest first.
    async fn list_posts(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>>;
    /// Insertion order.
    async fn list_images(&self, post_id: Uuid) -> anyhow::Result<Vec<Image>>;

    /// Atomically moves an `active` post to `pending_delete` with the given
    /// deadline. Never touches a post in any other state.
    async fn mark_pending_delete(
        &self,
        id: Uuid,
        delete_at: DateTime<Utc>,
    ) -> anyhow::Result<MarkOutcome>;

    /// Compare-and-delete: removes the post and its image rows only if the
    /// post is still `pending_delete`. Returns `None` when there was nothing
    /// to do. Safe to race with itself.
    async fn purge_if_pending(&self, id: Uuid) -> anyhow::Result<Option<PurgedPost>>;

    /// Ids of `pending_delete` posts whose deadline is at or before `now`.
    async fn list_overdue(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>>;
}

/// Persistence contract for user accounts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Returns `false` if the email is already registered.
    async fn create_user(&self, user: User) -> anyhow::Result<bool>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
}

/// Storage contract for uploaded image files.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Whitelist check on the client-supplied name and the leading bytes.
    fn accepts(&self, original_name: &str, data: &[u8]) -> bool;
    /// Saves raw bytes and returns the stored filename for the Image row.
    async fn save_image(&self, original_name: &str, data: Vec<u8>) -> anyhow::Result<String>;
    /// Removes a stored file. A file that is already gone counts as success.
    async fn delete_image(&self, filename: &str) -> Result<(), FileDeleteFailure>;
    /// Returns the public URL for a stored file.
    fn url_for(&self, filename: &str) -> String;
}

/// Password hashing and ownership proof.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produces a PHC-format hash for storage.
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    /// Verifies a password against a stored hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;
}

/// Wall-clock source, swappable in tests.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
