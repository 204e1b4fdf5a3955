//! Wall-clock sources for sync timestamps.

use crate::document::Timestamp;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of edit and save timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Timestamp::from_secs(secs)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            secs: Mutex::new(start.as_secs()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.secs.lock().unwrap_or_else(PoisonError::into_inner) = at.as_secs();
    }

    pub fn advance(&self, by: Duration) {
        *self.secs.lock().unwrap_or_else(PoisonError::into_inner) += by.as_secs_f64();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(*self.secs.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
