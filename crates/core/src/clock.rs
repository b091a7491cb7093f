//! Time source and local calendar helpers.
//!
//! Every component takes its notion of "now" from a [`Clock`] so that day
//! rollover and call ordering can be driven deterministically in tests.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Local calendar used to partition the queue by day.
///
/// Dates, weekday names and the `HH:MM:SS` row time are all derived in this
/// offset, so a deployment in a fixed timezone gets stable day boundaries
/// regardless of the host's TZ settings.
#[derive(Clone)]
pub struct Calendar {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { clock, offset }
    }

    /// Calendar using the host's current local offset.
    pub fn local(clock: Arc<dyn Clock>) -> Self {
        let offset = Local::now().offset().fix();
        Self::new(clock, offset)
    }

    /// Calendar with an explicit offset in minutes east of UTC.
    ///
    /// Falls back to UTC when the offset is out of range.
    pub fn with_offset_minutes(clock: Arc<dyn Clock>, minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Self::new(clock, offset)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.offset)
    }

    /// Today's date in the local calendar.
    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Weekday name (e.g. "Monday") for a local timestamp.
    pub fn day_name(at: &DateTime<FixedOffset>) -> String {
        at.format("%A").to_string()
    }

    /// Row time (`HH:MM:SS`) for a local timestamp.
    pub fn time_of_day(at: &DateTime<FixedOffset>) -> String {
        at.format("%H:%M:%S").to_string()
    }
}

impl std::fmt::Debug for Calendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calendar")
            .field("offset", &self.offset)
            .finish()
    }
}
