//! Per-session admission control for chat turns
//!
//! Each session owns a token bucket. A token buys one *turn*: the browser
//! sends a baseline and an enhanced request for the same user message, and
//! the second of those rides on the token the first one paid for.
//!
//! ```text
//!   session s1, turn 3, baseline  → charge 1 token, remember (turn 3, {baseline})
//!   session s1, turn 3, enhanced  → free, remember (turn 3, {baseline, enhanced})
//!   session s1, turn 3, baseline  → repeat of a paid mode, charge again
//!   session s1, turn 4, baseline  → new turn, charge 1 token
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::mode::Mode;

/// Buckets kept before full, idle ones are dropped
const PRUNE_THRESHOLD: usize = 1024;

struct SessionBucket {
    tokens: f64,
    last_refill: Instant,
    turn: Option<usize>,
    paid_modes: Vec<Mode>,
}

impl SessionBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            turn: None,
            paid_modes: Vec::new(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let new_tokens = elapsed * refill_rate;
        if new_tokens > 0.0 {
            self.tokens = (self.tokens + new_tokens).min(capacity);
            self.last_refill = now;
        }
    }
}

/// Keyed token bucket over session ids
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, SessionBucket>>,
}

impl RateLimiter {
    /// `capacity` turns in a burst, refilled at `refill_rate` turns per second
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// 10 turns in a burst, then one turn every two seconds
    pub fn with_defaults() -> Self {
        Self::new(10, 0.5)
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, SessionBucket>> {
        match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admit one request for `mode` on turn `turn` of `session_id`
    ///
    /// On rejection returns the wait until the session earns its next token.
    pub fn try_acquire(&self, session_id: &str, mode: Mode, turn: usize) -> Result<(), Duration> {
        let mut buckets = self.buckets();
        if buckets.len() >= PRUNE_THRESHOLD {
            self.prune(&mut buckets);
        }

        let bucket = buckets
            .entry(session_id.to_string())
            .or_insert_with(|| SessionBucket::new(self.capacity));
        bucket.refill(self.capacity, self.refill_rate);

        if bucket.turn == Some(turn) && !bucket.paid_modes.contains(&mode) {
            bucket.paid_modes.push(mode);
            return Ok(());
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.turn = Some(turn);
            bucket.paid_modes = vec![mode];
            Ok(())
        } else if self.refill_rate > 0.0 {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate))
        } else {
            Err(Duration::from_secs(60))
        }
    }

    /// Drop buckets that have refilled completely
    fn prune(&self, buckets: &mut HashMap<String, SessionBucket>) {
        let (capacity, rate) = (self.capacity, self.refill_rate);
        buckets.retain(|_, bucket| {
            bucket.refill(capacity, rate);
            bucket.tokens < capacity
        });
    }

    /// Forget a session, e.g. when it is closed
    pub fn forget(&self, session_id: &str) {
        self.buckets().remove(session_id);
    }

    /// Sessions with a bucket (for monitoring)
    pub fn tracked_sessions(&self) -> usize {
        self.buckets().len()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
