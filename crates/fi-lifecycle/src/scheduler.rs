//! One-shot deferred purge per post.
//!
//! Each armed post gets its own tokio task that sleeps for the grace period
//! and then runs the guarded purge. The task owns everything it needs, so it
//! outlives the request that armed it. There is no way to disarm a timer.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::purge::{PurgeOutcome, Purger};

pub struct DeletionScheduler {
    purger: Purger,
    grace_period: Duration,
    /// Posts with a live timer
    armed: Arc<DashMap<Uuid, ()>>,
}

/// Clears the armed flag when the timer task ends, however it ends.
struct ArmedGuard {
    armed: Arc<DashMap<Uuid, ()>>,
    post_id: Uuid,
}

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        self.armed.remove(&self.post_id);
    }
}

impl DeletionScheduler {
    pub fn new(purger: Purger, grace_period: Duration) -> Self {
        Self {
            purger,
            grace_period,
            armed: Arc::new(DashMap::new()),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn purger(&self) -> &Purger {
        &self.purger
    }

    pub fn is_armed(&self, post_id: Uuid) -> bool {
        self.armed.contains_key(&post_id)
    }

    /// Schedules a purge attempt `grace_period` from now and returns without
    /// waiting. Returns `None` if this post already has a live timer.
    ///
    /// The handle may be dropped; the task keeps running. Its result is only
    /// interesting to tests, since failures are already logged.
    pub fn arm(&self, post_id: Uuid) -> Option<JoinHandle<anyhow::Result<PurgeOutcome>>> {
        match self.armed.entry(post_id) {
            Entry::Occupied(_) => {
                log::debug!("post {post_id} already has a deletion timer");
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let guard = ArmedGuard {
            armed: Arc::clone(&self.armed),
            post_id,
        };
        let purger = self.purger.clone();
        // Deadline is fixed now, not when the task is first polled.
        let deadline = Instant::now() + self.grace_period;

        log::info!(
            "armed deletion of post {post_id} in {}s",
            self.grace_period.as_secs()
        );

        Some(tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep_until(deadline).await;

            let result = purger.purge(post_id).await;
            if let Err(e) = &result {
                // Post stays pending_delete; the sweeper will retry it.
                log::error!("scheduled purge of post {post_id} failed: {e:#}");
            }
            result
        }))
    }
}
