//! # Post lifecycle
//!
//! `active -> pending_delete -> purged`. Only the first step is reachable
//! from a request; the purge belongs to the scheduler and the sweeper.
//! Nothing leads back to `active`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fi_core::error::{DeleteError, DeleteRejection};
use fi_core::models::MarkOutcome;
use fi_core::traits::{AuthProvider, Clock, PostRepo, UserRepo};
use serde::Serialize;
use uuid::Uuid;

use crate::scheduler::DeletionScheduler;

/// Acknowledgment of an accepted delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingDeletion {
    pub post_id: Uuid,
    pub delete_at: DateTime<Utc>,
}

pub struct PostLifecycle {
    posts: Arc<dyn PostRepo>,
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
    scheduler: Arc<DeletionScheduler>,
    clock: Arc<dyn Clock>,
}

impl PostLifecycle {
    pub fn new(
        posts: Arc<dyn PostRepo>,
        users: Arc<dyn UserRepo>,
        auth: Arc<dyn AuthProvider>,
        scheduler: Arc<DeletionScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            posts,
            users,
            auth,
            scheduler,
            clock,
        }
    }

    pub fn scheduler(&self) -> &Arc<DeletionScheduler> {
        &self.scheduler
    }

    /// Starts the grace period for `post_id` on behalf of `requester_id`, who
    /// must own the post and re-enter their password as `credential`.
    ///
    /// Rejections leave the post untouched. A post that is already pending
    /// keeps its original deadline and is not re-armed.
    pub async fn request_delete(
        &self,
        post_id: Uuid,
        requester_id: Uuid,
        credential: &str,
    ) -> Result<PendingDeletion, DeleteError> {
        let post = self
            .posts
            .get_post(post_id)
            .await?
            .ok_or(DeleteRejection::NotFound)?;

        if post.owner_id != requester_id {
            log::info!("user {requester_id} tried to delete post {post_id} they do not own");
            return Err(DeleteRejection::NotOwner.into());
        }

        let requester = self
            .users
            .get_user(requester_id)
            .await?
            .ok_or(DeleteRejection::InvalidCredential)?;
        if !self
            .auth
            .verify_password(credential, &requester.password_hash)
            .await
        {
            return Err(DeleteRejection::InvalidCredential.into());
        }

        if post.state.is_pending_delete() {
            return Err(DeleteRejection::AlreadyPending.into());
        }

        let grace = chrono::Duration::from_std(self.scheduler.grace_period())
            .map_err(anyhow::Error::from)?;
        let delete_at = self.clock.now() + grace;

        // The read above may be stale; the conditional update is what counts.
        match self.posts.mark_pending_delete(post_id, delete_at).await? {
            MarkOutcome::Marked => {}
            MarkOutcome::AlreadyPending => return Err(DeleteRejection::AlreadyPending.into()),
            MarkOutcome::Missing => return Err(DeleteRejection::NotFound.into()),
        }

        self.scheduler.arm(post_id);
        log::info!("post {post_id} pending deletion at {delete_at}");

        Ok(PendingDeletion { post_id, delete_at })
    }
}
