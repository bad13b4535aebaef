// Token bucket capping total notifications per hour across all alerts.

use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Snapshot of the limiter for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    pub available_tokens: f64,
    pub capacity: f64,
    pub refill_rate_per_second: f64,
}

/// Token bucket with continuous fractional refill.
#[derive(Debug, Clone)]
pub struct TokenBucketRateLimiter {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucketRateLimiter {
    /// Create a full bucket allowing `max_per_hour` notifications per hour.
    /// Zero or negative capacity yields a limiter that always denies.
    pub fn new(max_per_hour: i64, now: DateTime<Utc>) -> Self {
        let capacity = max_per_hour.max(0) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / SECONDS_PER_HOUR,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        // Never step back, or the same interval would be credited twice
        self.last_refill = self.last_refill.max(now);
    }

    /// Take one token if available.
    pub fn check_rate_limit(&mut self) -> bool {
        self.check_at(Utc::now())
    }

    pub fn check_at(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change capacity while keeping the bucket equally full, proportionally.
    ///
    /// A previously zero-capacity bucket starts full under the new capacity,
    /// the same as a freshly created limiter.
    pub fn update_capacity(&mut self, max_per_hour: i64, now: DateTime<Utc>) {
        self.refill(now);
        let ratio = if self.capacity > 0.0 {
            (self.tokens / self.capacity).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let capacity = max_per_hour.max(0) as f64;
        self.capacity = capacity;
        self.refill_rate = capacity / SECONDS_PER_HOUR;
        self.tokens = capacity * ratio;
    }

    pub fn available_tokens_at(&mut self, now: DateTime<Utc>) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn stats_at(&mut self, now: DateTime<Utc>) -> RateLimiterStats {
        RateLimiterStats {
            available_tokens: self.available_tokens_at(now),
            capacity: self.capacity,
            refill_rate_per_second: self.refill_rate,
        }
    }
}
