//! Token-bucket-flavored fixed-window limiter (spec §4.1). Two counters:
//! per-domain (default 30/min) and global (default 100/min). Windows reset
//! lazily when a call arrives past `window_start + window_len`. Purely
//! in-memory — losing state on restart only defers work, never violates
//! correctness, so a `parking_lot::Mutex` over plain maps is enough; no
//! external limiter crate is pulled in for this.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::SharedClock;

struct Window {
    start: DateTime<Utc>,
    count: u32,
}

pub struct RateLimiter {
    clock: SharedClock,
    window_len: Duration,
    per_domain_limit: u32,
    global_limit: u32,
    domain_windows: Mutex<HashMap<String, Window>>,
    global_window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(clock: SharedClock, per_domain_limit: u32, global_limit: u32) -> Self {
        let now = clock.now();
        Self {
            clock,
            window_len: Duration::from_secs(60),
            per_domain_limit,
            global_limit,
            domain_windows: Mutex::new(HashMap::new()),
            global_window: Mutex::new(Window { start: now, count: 0 }),
        }
    }

    fn window_expired(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - start).to_std().unwrap_or_default() >= self.window_len
    }

    /// Atomically checks and consumes one unit of both the per-domain and
    /// the global budget. Returns `false` (deferral, not a failure) if
    /// either is exhausted.
    pub fn try_acquire(&self, domain_id: &str) -> bool {
        let now = self.clock.now();

        let mut global = self.global_window.lock();
        if self.window_expired(global.start, now) {
            global.start = now;
            global.count = 0;
        }

        let mut domains = self.domain_windows.lock();
        let window = domains.entry(domain_id.to_string()).or_insert_with(|| Window {
            start: now,
            count: 0,
        });
        if self.window_expired(window.start, now) {
            window.start = now;
            window.count = 0;
        }

        if global.count >= self.global_limit || window.count >= self.per_domain_limit {
            return false;
        }

        global.count += 1;
        window.count += 1;
        true
    }
}
