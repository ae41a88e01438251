//! Fixed-window rate limiting keyed by client address.
//!
//! Each limiter owns its counters. Two instances are wired into the app:
//! a general one for every route and a stricter one for report submission.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    /// 100 requests per 15 minutes, across all routes.
    pub const GENERAL: Self = Self {
        max_requests: 100,
        window: Duration::from_secs(15 * 60),
    };

    /// 5 submissions per hour.
    pub const SUBMISSION: Self = Self {
        max_requests: 5,
        window: Duration::from_secs(60 * 60),
    };
}

/// Outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit of {limit} exceeded, retry in {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Count a request for `key`, rejecting it if the window is full.
    pub fn check(&self, key: &str) -> Result<RateLimitStatus, RateLimitExceeded> {
        self.check_at(key, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    /// Rejected requests are not counted.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<RateLimitStatus, RateLimitExceeded> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let window = windows.entry(key.to_owned()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.policy.window {
            window.count = 0;
            window.started = now;
        }

        let reset_after = self.policy.window.saturating_sub(now.duration_since(window.started));

        if window.count >= self.policy.max_requests {
            return Err(RateLimitExceeded {
                limit: self.policy.max_requests,
                retry_after_secs: ceil_secs(reset_after).max(1),
            });
        }

        window.count += 1;
        Ok(RateLimitStatus {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests - window.count,
            reset_after,
        })
    }

    /// Drop windows that have expired. Returns how many keys were evicted.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.policy.window);
        before - windows.len()
    }

    /// Number of keys currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
