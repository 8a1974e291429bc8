//! Wall-clock abstraction for cache TTLs

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now" for every TTL comparison
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

/// Hand-driven clock for tests and replay
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Next-check bookkeeping shared by every polling cache
///
/// A check is due only once `now` has moved strictly past the deadline, so a
/// stalled clock never forces a refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckSchedule {
    next_check_at: Option<DateTime<Utc>>,
}

impl CheckSchedule {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_check_at {
            None => true,
            Some(at) => now > at,
        }
    }

    pub fn schedule_after(&mut self, now: DateTime<Utc>, interval: std::time::Duration) {
        let interval = Duration::from_std(interval).unwrap_or_else(|_| Duration::days(36_500));
        self.next_check_at = Some(
            now.checked_add_signed(interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
    }

    /// Make the next call due regardless of the deadline
    pub fn reset(&mut self) {
        self.next_check_at = None;
    }

    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        self.next_check_at
    }
}
