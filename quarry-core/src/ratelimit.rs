//! Per-(org, user) request rate limiting.
//!
//! A classic token bucket: each principal gets `capacity` tokens that
//! refill continuously at `refill_per_sec`. The transport shell calls
//! [`RateLimiter::check`] once per inbound request and maps a refusal to
//! 429.

use crate::ids::{OrgId, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Bucket parameters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Burst size.
    pub capacity: f64,
    /// Sustained request rate.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30.0,
            refill_per_sec: 10.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token buckets keyed by (org, user).
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(OrgId, UserId), Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Limiter with the given bucket parameters.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Spend one token for a request. Returns whether the request may
    /// proceed.
    #[must_use]
    pub fn check(&self, org_id: OrgId, user_id: UserId) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry((org_id, user_id)).or_insert(Bucket {
            tokens: self.config.capacity,
            last_refill: Instant::now(),
        });

        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refusal() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 3.0,
            refill_per_sec: 0.0,
        });
        let org = OrgId::new();
        let user = UserId::new();

        assert!(limiter.check(org, user));
        assert!(limiter.check(org, user));
        assert!(limiter.check(org, user));
        assert!(!limiter.check(org, user));
    }

    #[test]
    fn test_buckets_are_per_principal() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1.0,
            refill_per_sec: 0.0,
        });
        let org = OrgId::new();
        let alice = UserId::new();
        let bob = UserId::new();

        assert!(limiter.check(org, alice));
        assert!(!limiter.check(org, alice));
        // Bob's bucket is untouched by Alice's burst.
        assert!(limiter.check(org, bob));
        // The same user in another org gets a separate bucket too.
        assert!(limiter.check(OrgId::new(), alice));
    }
}
