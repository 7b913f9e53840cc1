//! Token bucket used to throttle calls to the control plane.
//!
//! `rate` tokens are added per second up to `capacity`. A full bucket lets a
//! burst of `capacity` calls through at once; afterwards calls are spaced by
//! `1 / rate` seconds.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Result of a non-blocking acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Permits granted.
    Allowed {
        /// Whole tokens left after this acquisition.
        remaining: u32,
    },
    /// Not enough tokens; retry after `wait`.
    Denied { wait: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// In-process token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket refilled at `rate` tokens per second holding at most `capacity`
    /// tokens. Starts full. Non-positive inputs are clamped to a minimal
    /// working bucket.
    pub fn new(rate: f64, capacity: u32) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1e-3 };
        let capacity = f64::from(capacity.max(1));
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Take `permits` tokens if available, without waiting.
    pub fn try_acquire(&self, permits: u32) -> Decision {
        let cost = f64::from(permits).min(self.capacity);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= cost {
            state.tokens -= cost;
            Decision::Allowed { remaining: state.tokens as u32 }
        } else {
            let missing = cost - state.tokens;
            Decision::Denied { wait: Duration::from_secs_f64(missing / self.rate) }
        }
    }

    /// Wait until `permits` tokens are available and take them.
    pub async fn acquire(&self, permits: u32) {
        loop {
            match self.try_acquire(permits) {
                Decision::Allowed { .. } => return,
                Decision::Denied { wait } => tokio::time::sleep(wait).await,
            }
        }
    }
}
