//! Time source abstraction
//!
//! Polling loops and snapshot allocation read time through `Clock` so tests
//! can drive them deterministically with `ManualClock`.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Wall-clock reads and blocking sleeps
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Real time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// Deterministic clock: `sleep` returns immediately and advances `now`
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        }
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .map(|s| s.sleeps.clone())
            .unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().map(|s| s.now).unwrap_or_else(|_| Utc::now())
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.sleeps.push(duration);
            state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        }
    }
}
