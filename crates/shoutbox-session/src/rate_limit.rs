//! Sliding-window rate limiting per participant and action.
//!
//! Each key keeps the instants of its recent allowed calls. A call is
//! allowed while fewer than `limit` of those instants fall inside the
//! trailing `window`; allowed calls are recorded, denied calls are not.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use shoutbox_protocol::UserId;
use tokio::time::Instant;

/// Limits for a single rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls allowed per window.
    pub limit: usize,
    /// Length of the trailing window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    /// Chat defaults: 20 messages per 60 seconds.
    fn default() -> Self {
        Self {
            limit: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// What is being limited: a participant performing a named action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub user: UserId,
    pub action: &'static str,
}

impl RateKey {
    /// Action name used for chat messages.
    pub const CHAT: &'static str = "message";

    /// Key for `user` posting chat messages.
    pub fn chat(user: UserId) -> Self {
        Self {
            user,
            action: Self::CHAT,
        }
    }
}

/// Shared sliding-window rate limiter.
///
/// The map sits behind a [`std::sync::Mutex`]: every operation is a short,
/// non-async critical section, so concurrent calls for the same key see
/// each other's writes.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<RateKey, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `key` against `config` at the current time.
    pub fn check(&self, key: &RateKey, config: RateLimitConfig) -> bool {
        self.allow(key, config.limit, config.window)
    }

    /// Returns `true` and records the call if `key` has made fewer than
    /// `limit` calls in the trailing `window`.
    pub fn allow(&self, key: &RateKey, limit: usize, window: Duration) -> bool {
        self.allow_at(key, limit, window, Instant::now())
    }

    /// [`allow`](Self::allow) with an explicit clock reading.
    pub fn allow_at(&self, key: &RateKey, limit: usize, window: Duration, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamps = windows.entry(key.clone()).or_default();
        evict_older_than(stamps, window, now);

        if stamps.len() >= limit {
            tracing::debug!(user = %key.user, action = key.action, "rate limited");
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Drops keys with no calls inside `window`. Returns how many were
    /// removed.
    pub fn prune(&self, window: Duration) -> usize {
        self.prune_at(window, Instant::now())
    }

    /// [`prune`](Self::prune) with an explicit clock reading.
    pub fn prune_at(&self, window: Duration, now: Instant) -> usize {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = windows.len();
        windows.retain(|_, stamps| {
            evict_older_than(stamps, window, now);
            !stamps.is_empty()
        });
        before - windows.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn evict_older_than(stamps: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        stamps.pop_front();
    }
}
