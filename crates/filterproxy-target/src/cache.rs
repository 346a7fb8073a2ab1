//! Single-flight refresh cell.
//!
//! One cell guards one cached value. Every caller takes the cell's lock for
//! the whole read-or-refresh decision, so at most one refresh runs at a time
//! and a caller queued behind a refresh sees its result instead of starting
//! another one.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use filterproxy_common::{
    error::Result,
    time::{Clock, is_fresh},
};
use tokio::sync::Mutex;

struct Slot<T> {
    value: Option<T>,
    refreshed_at: Option<DateTime<Utc>>,
}

pub struct SingleFlight<T> {
    refresh_interval: Duration,
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            slot: Mutex::new(Slot {
                value: None,
                refreshed_at: None,
            }),
        }
    }

    /// Returns the cached value while it is fresh, otherwise runs `refresh`
    /// once and stores its result.
    ///
    /// A failed refresh leaves the previous value and timestamp untouched so
    /// the next call tries again. Dropping the returned future releases the
    /// lock.
    pub async fn get_or_refresh<F, Fut>(&self, clock: &dyn Clock, refresh: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.slot.lock().await;
        if let (Some(value), Some(refreshed_at)) = (&slot.value, slot.refreshed_at)
            && is_fresh(refreshed_at, clock.now(), self.refresh_interval)
        {
            return Ok(value.clone());
        }

        let value = refresh().await?;
        slot.value = Some(value.clone());
        slot.refreshed_at = Some(clock.now());
        Ok(value)
    }
}
