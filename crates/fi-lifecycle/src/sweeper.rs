//! Periodic sweep for overdue `pending_delete` posts.
//!
//! Timers live in memory, so a restart loses them, and a purge that hit a
//! storage error leaves its post pending. The sweeper covers both: it purges
//! every pending post whose `delete_at` has passed. The first tick fires
//! immediately, which makes it the startup recovery pass as well.

use std::sync::Arc;
use std::time::Duration;

use fi_core::traits::{Clock, PostRepo};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::purge::{PurgeOutcome, Purger};

/// Counts from a single sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct PurgeSweeper {
    posts: Arc<dyn PostRepo>,
    purger: Purger,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PurgeSweeper {
    /// Returns the sweeper and the sender that stops it.
    pub fn new(
        posts: Arc<dyn PostRepo>,
        purger: Purger,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let sweeper = Self {
            posts,
            purger,
            clock,
            interval,
            shutdown_rx,
        };
        (sweeper, shutdown_tx)
    }

    /// Run the sweeper until shutdown is signaled.
    pub async fn run(&mut self) {
        log::info!("purge sweeper starting (every {}s)", self.interval.as_secs());

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    log::info!("purge sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report != SweepReport::default() => {
                            log::info!(
                                "sweep: {} purged, {} skipped, {} failed",
                                report.purged, report.skipped, report.failed
                            );
                        }
                        Ok(_) => {}
                        Err(e) => log::error!("error listing overdue posts: {e:#}"),
                    }
                }
            }
        }

        log::info!("purge sweeper stopped");
    }

    /// One pass. A failure on one post is logged and the pass moves on.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let overdue = self.posts.list_overdue(self.clock.now()).await?;
        let mut report = SweepReport::default();

        for post_id in overdue {
            match self.purger.purge(post_id).await {
                Ok(PurgeOutcome::Purged { .. }) => report.purged += 1,
                Ok(PurgeOutcome::NothingToDo) => report.skipped += 1,
                Err(e) => {
                    log::error!("sweeper could not purge post {post_id}: {e:#}");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
