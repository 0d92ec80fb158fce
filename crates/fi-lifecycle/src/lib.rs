//! fi-lifecycle
//!
//! Post deletion for FoundIt: the state machine that accepts a delete
//! request, the per-post timer that waits out the grace period, the guarded
//! purge, and the sweeper that catches anything the timers missed.

pub mod lifecycle;
pub mod purge;
pub mod scheduler;
pub mod sweeper;

pub use lifecycle::{PendingDeletion, PostLifecycle};
pub use purge::{PurgeOutcome, Purger};
pub use scheduler::DeletionScheduler;
pub use sweeper::{PurgeSweeper, SweepReport};
