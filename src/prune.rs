//! Tombstone pruning policy.
//!
//! Tombstones are kept so lagging clients can reconcile deletions, but the
//! history is bounded: once the count passes [`MAX_TOMBSTONES`], the oldest
//! entries are dropped down to roughly [`PRUNE_BUFFER`] retained, and the
//! history watermark advances so clients older than it get a full resend.
//! Pruning is deferred behind a trailing-edge throttle so delete bursts
//! collapse into a single run.

use crate::Clock;
use std::time::{Duration, Instant};

/// Soft upper bound on the number of retained tombstones.
pub const MAX_TOMBSTONES: usize = 5000;

/// Minimum number of most-recent tombstones kept by a prune.
pub const PRUNE_BUFFER: usize = 1000;

/// Bounds on tombstone history and the throttle window for deferred pruning.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Prune only when the tombstone count exceeds this.
    pub max_tombstones: usize,
    /// Keep at least this many of the most recent tombstones.
    pub prune_buffer: usize,
    /// Quiet period between effective prune runs.
    pub window: Duration,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            max_tombstones: MAX_TOMBSTONES,
            prune_buffer: PRUNE_BUFFER,
            window: Duration::from_secs(1),
        }
    }
}

/// Trailing-edge throttle for deferred prune runs.
///
/// The store requests a run after every delete; requests during an armed
/// window coalesce into the one already scheduled. The host drives the
/// clock by polling, so behavior is deterministic under test.
#[derive(Debug)]
pub(crate) struct PruneScheduler {
    window: Duration,
    deadline: Option<Instant>,
}

impl PruneScheduler {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arm the scheduler. A deadline already armed is left in place so a
    /// burst of requests fires once, at its trailing edge.
    pub(crate) fn request(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    /// Whether a prune run is pending.
    pub(crate) fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the deadline if it has elapsed.
    pub(crate) fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Index of the first tombstone to drop, given clocks sorted descending.
///
/// Starts at `buffer` and walks forward until the cut lands on a clock
/// boundary, so a cohort of tombstones sharing one clock is retained or
/// dropped as a whole, never split.
pub(crate) fn cohort_cutoff(clocks: &[Clock], buffer: usize) -> usize {
    let mut cutoff = buffer.min(clocks.len());
    while cutoff > 0 && cutoff < clocks.len() && clocks[cutoff - 1] == clocks[cutoff] {
        cutoff += 1;
    }
    cutoff
}
