//! Rate-limiting capability.
//!
//! Injected into the engine instead of a per-process static map so a
//! multi-instance deployment can swap in a shared store.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Capability consulted before recording a rate-limited action.
pub trait RateLimiter: Send {
    /// Returns `true` and records the hit if `key` is under its limit.
    fn check_and_record(&mut self, key: &str, now: DateTime<Utc>) -> bool;
}

/// In-memory fixed-window limiter: at most `max` hits per `window` per key.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    hits: HashMap<String, Vec<DateTime<Utc>>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: HashMap::new(),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_and_record(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let hits = self.hits.entry(key.to_string()).or_default();
        hits.retain(|at| now - *at < self.window);
        if hits.len() < self.max as usize {
            hits.push(now);
            true
        } else {
            false
        }
    }
}

/// Limiter that never refuses. Useful for tests and replay tooling.
#[derive(Debug, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn check_and_record(&mut self, _key: &str, _now: DateTime<Utc>) -> bool {
        true
    }
}
