use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Source of the current time for refresh decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::TimeDelta::from_std(by) else {
            return;
        };
        if let Ok(mut current) = self.current.lock() {
            *current += delta;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Whether a value refreshed at `refreshed_at` is still authoritative at `now`.
///
/// A zero interval is never fresh. If the clock went backwards the value is
/// kept until the clock catches up.
pub fn is_fresh(refreshed_at: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    if interval.is_zero() {
        return false;
    }
    match (now - refreshed_at).to_std() {
        Ok(elapsed) => elapsed < interval,
        Err(_) => true,
    }
}
