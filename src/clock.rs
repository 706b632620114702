//! Monotonic time source (spec §4.1). Production runs on `SystemClock`;
//! tests drive a `VirtualClock` instead of real `sleep`s, the way the
//! original system's scheduler tests stub out `setTimeout`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value only moves when `advance`/`set` is called. Shared via
/// `Arc` so engine and test both hold a handle to the same moment.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<RwLock<DateTime<Utc>>>,
}

impl VirtualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.write() = at;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.write();
        *guard = *guard + delta;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.read()
    }
}

pub type SharedClock = Arc<dyn Clock>;
