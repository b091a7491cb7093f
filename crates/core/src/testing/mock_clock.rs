//! Settable clock and in-memory day marker.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::clock::Clock;
use crate::sequence::{DayMarker, MarkerError};

/// Clock frozen at a chosen instant until moved.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock at an RFC 3339 instant, e.g. `"2024-01-01T09:00:00Z"`.
    ///
    /// Panics on a malformed timestamp; meant for test setup only.
    pub fn at(rfc3339: &str) -> Self {
        Self::new(parse(rfc3339))
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn set_str(&self, rfc3339: &str) {
        self.set(parse(rfc3339));
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

fn parse(rfc3339: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => panic!("invalid test timestamp {:?}: {}", rfc3339, e),
    }
}

/// Day marker kept in memory.
#[derive(Debug, Default)]
pub struct MemoryDayMarker {
    date: Mutex<Option<NaiveDate>>,
    fail_writes: Mutex<bool>,
}

impl MemoryDayMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<NaiveDate> {
        *self.date.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, date: Option<NaiveDate>) {
        *self.date.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

impl DayMarker for MemoryDayMarker {
    fn read(&self) -> Result<Option<NaiveDate>, MarkerError> {
        Ok(self.current())
    }

    fn write(&self, date: NaiveDate) -> Result<(), MarkerError> {
        if *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(MarkerError::Io {
                path: "<memory>".to_string(),
                message: "read-only marker".to_string(),
            });
        }
        self.set(Some(date));
        Ok(())
    }
}
