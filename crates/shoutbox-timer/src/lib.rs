//! Keyed one-shot deadline scheduler for Shoutbox.
//!
//! Games need "do X at time T unless something else happens first": a poll
//! closes when its duration elapses, a tile-sort round closes when its time
//! limit runs out. Rather than spawning a detached task per timer (which
//! would race the room it belongs to), a room actor owns one
//! [`DeadlineScheduler`] and awaits it next to its command channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = deadlines.expired() => { /* re-check game identity, then act */ }
//!     }
//! }
//! ```
//!
//! Expiry is therefore processed by the same task as client commands and
//! is strictly ordered with them.
//!
//! # Keys
//!
//! Each deadline has a key `K`. Scheduling an existing key moves its
//! deadline; [`DeadlineScheduler::cancel`] removes it. The key should carry
//! enough identity (for example a game id and round number) for the owner
//! to recognise a deadline that outlived the thing it was set for.

use std::fmt::Debug;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// A deadline that has been reached, returned by
/// [`DeadlineScheduler::expired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K> {
    /// The key the deadline was scheduled under.
    pub key: K,
    /// When it was due.
    pub deadline: Instant,
    /// How far past the deadline the scheduler woke up.
    pub late_by: Duration,
}

/// Owns a set of keyed deadlines and resolves them in time order.
///
/// Deadlines use Tokio's clock, so tests can drive them with
/// `tokio::time::pause()` / `advance()`.
#[derive(Debug)]
pub struct DeadlineScheduler<K> {
    entries: Vec<(K, Instant)>,
    /// Wake-ups later than this are logged as warnings.
    late_warn: Duration,
}

impl<K> Default for DeadlineScheduler<K>
where
    K: Clone + PartialEq + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DeadlineScheduler<K>
where
    K: Clone + PartialEq + Debug,
{
    /// Default threshold for late-wakeup warnings.
    pub const DEFAULT_LATE_WARN: Duration = Duration::from_millis(250);

    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            late_warn: Self::DEFAULT_LATE_WARN,
        }
    }

    /// Sets the late-wakeup warning threshold.
    pub fn with_late_warn(mut self, late_warn: Duration) -> Self {
        self.late_warn = late_warn;
        self
    }

    /// Schedules `key` to fire at `at`, replacing any deadline it already had.
    pub fn schedule_at(&mut self, key: K, at: Instant) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            debug!(?key, "deadline rescheduled");
            entry.1 = at;
        } else {
            debug!(?key, "deadline scheduled");
            self.entries.push((key, at));
        }
    }

    /// Schedules `key` to fire `after` from now.
    pub fn schedule_in(&mut self, key: K, after: Duration) {
        self.schedule_at(key, Instant::now() + after);
    }

    /// Removes the deadline for `key`. Returns `true` if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        let removed = self.entries.len() != before;
        if removed {
            debug!(?key, "deadline cancelled");
        }
        removed
    }

    /// Removes every deadline whose key matches `pred`. Returns how many
    /// were removed.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !pred(k));
        before - self.entries.len()
    }

    /// Returns `true` if `key` has a pending deadline.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(_, at)| *at).min()
    }

    /// Number of pending deadlines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for the earliest deadline and removes it.
    ///
    /// With nothing scheduled this future pends forever, which lets it sit
    /// in a `tokio::select!` next to a command channel. It is cancel-safe:
    /// the deadline is only removed once the sleep completes, so dropping
    /// the future (because another branch won) loses nothing.
    pub async fn expired(&mut self) -> Fired<K> {
        let Some(deadline) = self.next_deadline() else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        let now = Instant::now();
        let idx = self
            .entries
            .iter()
            .position(|(_, at)| *at == deadline)
            .unwrap_or(0);
        let (key, deadline) = self.entries.swap_remove(idx);
        let late_by = now.saturating_duration_since(deadline);

        if late_by > self.late_warn {
            warn!(
                ?key,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "deadline fired late"
            );
        } else {
            trace!(?key, "deadline fired");
        }

        Fired {
            key,
            deadline,
            late_by,
        }
    }
}
