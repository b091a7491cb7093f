use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::DayMarker;
use crate::audit::{AuditEvent, AuditHandle, AuditSink};
use crate::clock::Calendar;
use crate::ledger::{CallLedger, LedgerError};
use crate::metrics;
use crate::registry::{Registry, RegistryError};

#[derive(Debug, Error)]
pub enum SequenceError {
    /// The registry could not be read or written. Nothing was changed.
    #[error("Registry unavailable: {0}")]
    TransientRegistry(#[from] RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sequence state unavailable: {0}")]
    State(String),
}

/// Result of a day check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayStatus {
    pub date: NaiveDate,
    /// Set when the marker held a different (or no) date.
    pub rolled_over: bool,
    pub counter: u32,
    pub warnings: Vec<String>,
}

/// What a reset removed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResetReport {
    pub date: NaiveDate,
    pub tickets_removed: usize,
    pub calls_removed: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct CounterState {
    date: Option<NaiveDate>,
    counter: u32,
}

/// Owns "what number comes next" for each day.
///
/// The registry row count is the only durable state; the cached counter is
/// rebuilt from it at startup, on rollover, and whenever an append conflicts.
pub struct SequenceAuthority {
    registry: Arc<dyn Registry>,
    ledger: Arc<dyn CallLedger>,
    marker: Arc<dyn DayMarker>,
    calendar: Calendar,
    state: Mutex<CounterState>,
    audit: Option<AuditHandle>,
}

impl SequenceAuthority {
    pub fn new(
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn CallLedger>,
        marker: Arc<dyn DayMarker>,
        calendar: Calendar,
    ) -> Self {
        Self {
            registry,
            ledger,
            marker,
            calendar,
            state: Mutex::new(CounterState::default()),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CounterState>, SequenceError> {
        self.state
            .lock()
            .map_err(|_| SequenceError::State("counter lock poisoned".to_string()))
    }

    /// Load today's counter at service start.
    pub fn startup(&self) -> Result<DayStatus, SequenceError> {
        let status = self.ensure_current_day()?;
        info!(
            date = %status.date,
            counter = status.counter,
            rolled_over = status.rolled_over,
            "Sequence authority ready"
        );
        Ok(status)
    }

    /// Compare the persisted marker with today and roll the day if needed.
    ///
    /// On a new day the marker is rewritten and the partition created, then
    /// the counter is resynchronised from the registry so tickets another
    /// process already issued today are never reissued. A marker that cannot
    /// be written is reported as a warning; the registry stays authoritative.
    pub fn ensure_current_day(&self) -> Result<DayStatus, SequenceError> {
        let today = self.calendar.today();
        let mut warnings = Vec::new();

        let marker_date = match self.marker.read() {
            Ok(date) => date,
            Err(e) => {
                warn!("Day marker unreadable, treating as a new day: {}", e);
                warnings.push(format!("day marker unreadable: {}", e));
                None
            }
        };

        let mut state = self.lock_state()?;
        let marker_stale = marker_date != Some(today);
        let state_stale = state.date != Some(today);
        if !marker_stale && !state_stale {
            return Ok(DayStatus {
                date: today,
                rolled_over: false,
                counter: state.counter,
                warnings,
            });
        }
        // A marker that only lags the in-memory day (an earlier write failed)
        // is rewritten without counting as another rollover.
        let rolled_over = marker_stale && state_stale;

        self.registry.create_day_partition(today)?;

        if marker_stale {
            state.counter = 0;
            if let Err(e) = self.marker.write(today) {
                warn!(date = %today, "Failed to rewrite day marker: {}", e);
                warnings.push(format!("day marker not updated: {}", e));
            }
        }

        let count = self.registry.count_rows(today)?;
        state.date = Some(today);
        state.counter = count;
        metrics::CURRENT_SEQUENCE.set(i64::from(count));

        if rolled_over {
            info!(previous = ?marker_date, date = %today, resynced = count, "Day rolled over");
            metrics::DAY_ROLLOVERS.inc();
            self.audit.record(AuditEvent::DayRolledOver {
                previous: marker_date,
                date: today,
                resynced_count: count,
            });
        } else {
            debug!(date = %today, counter = count, "Counter loaded from registry");
        }

        Ok(DayStatus {
            date: today,
            rolled_over,
            counter: count,
            warnings,
        })
    }

    /// `1 + count(tickets for date)`, always read from the registry.
    pub fn next_sequence(&self, date: NaiveDate) -> Result<u32, SequenceError> {
        let count = self.registry.count_rows(date)?;
        Ok(count + 1)
    }

    /// Last committed number for the active day.
    pub fn cached_counter(&self) -> Result<u32, SequenceError> {
        Ok(self.lock_state()?.counter)
    }

    /// Record that `n` was durably appended for `date`.
    pub fn commit(&self, date: NaiveDate, n: u32) -> Result<(), SequenceError> {
        let mut state = self.lock_state()?;
        if state.date == Some(date) && n > state.counter {
            state.counter = n;
            metrics::CURRENT_SEQUENCE.set(i64::from(n));
        }
        Ok(())
    }

    /// Reload the counter for `date` from the registry.
    pub fn resync(&self, date: NaiveDate) -> Result<u32, SequenceError> {
        let count = self.registry.count_rows(date)?;
        let mut state = self.lock_state()?;
        state.date = Some(date);
        state.counter = count;
        metrics::CURRENT_SEQUENCE.set(i64::from(count));
        Ok(count)
    }

    /// Wipe `date`: registry rows and ledger records. When `date` is today
    /// the marker is rewritten and the counter restarts at zero.
    ///
    /// Not ordered against issuance; callers that issue go through
    /// `TicketIssuer::reset_day`.
    pub fn reset(&self, date: NaiveDate, actor: &str) -> Result<ResetReport, SequenceError> {
        let mut warnings = Vec::new();
        let mut state = self.lock_state()?;

        self.registry.create_day_partition(date)?;
        let tickets_removed = self.registry.clear_rows(date)?;
        let calls_removed = self.ledger.clear(date)?;

        // Only the active day owns the marker and the cached counter.
        if date == self.calendar.today() {
            if let Err(e) = self.marker.write(date) {
                warn!(date = %date, "Failed to rewrite day marker on reset: {}", e);
                warnings.push(format!("day marker not updated: {}", e));
            }
            state.date = Some(date);
            state.counter = 0;
            metrics::CURRENT_SEQUENCE.set(0);
        }

        info!(date = %date, tickets_removed, calls_removed, actor, "Day reset");
        self.audit.record(AuditEvent::DayReset {
            date,
            reset_by: actor.to_string(),
            tickets_removed,
            calls_removed,
        });

        Ok(ResetReport {
            date,
            tickets_removed,
            calls_removed,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::ledger::{ClaimRequest, SqliteLedger};
    use crate::registry::SqliteRegistry;
    use crate::testing::fixtures::ticket_on;
    use crate::testing::{FixedClock, MemoryDayMarker, MockRegistry};

    struct Harness {
        clock: Arc<FixedClock>,
        registry: Arc<MockRegistry>,
        ledger: Arc<SqliteLedger>,
        marker: Arc<MemoryDayMarker>,
        authority: SequenceAuthority,
    }

    fn harness(at: &str) -> Harness {
        let clock = Arc::new(FixedClock::at(at));
        let registry = Arc::new(MockRegistry::new());
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        let marker = Arc::new(MemoryDayMarker::new());
        let authority = SequenceAuthority::new(
            registry.clone(),
            ledger.clone(),
            marker.clone(),
            Calendar::with_offset_minutes(clock.clone(), 0),
        );
        Harness {
            clock,
            registry,
            ledger,
            marker,
            authority,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_startup_on_fresh_install_rolls_over() {
        let h = harness("2024-01-01T09:00:00Z");

        let status = h.authority.startup().unwrap();

        assert!(status.rolled_over);
        assert_eq!(status.counter, 0);
        assert_eq!(h.marker.current(), Some(date("2024-01-01")));
        assert!(h.registry.has_partition(date("2024-01-01")));
    }

    #[test]
    fn test_startup_with_matching_marker_loads_count() {
        let h = harness("2024-01-01T09:00:00Z");
        let d = date("2024-01-01");
        h.marker.set(Some(d));
        h.registry.seed(vec![ticket_on(d, 1, "Asha"), ticket_on(d, 2, "Ben")]);

        let status = h.authority.startup().unwrap();

        assert!(!status.rolled_over);
        assert_eq!(status.counter, 2);
        assert_eq!(h.authority.next_sequence(d).unwrap(), 3);
    }

    #[test]
    fn test_next_sequence_is_idempotent() {
        let h = harness("2024-01-01T09:00:00Z");
        let d = date("2024-01-01");
        h.registry.seed(vec![ticket_on(d, 1, "Asha")]);

        assert_eq!(h.authority.next_sequence(d).unwrap(), 2);
        assert_eq!(h.authority.next_sequence(d).unwrap(), 2);
    }

    #[test]
    fn test_next_sequence_fails_during_outage() {
        let h = harness("2024-01-01T09:00:00Z");
        h.registry.set_unavailable(true);

        let err = h.authority.next_sequence(date("2024-01-01")).unwrap_err();
        assert!(matches!(err, SequenceError::TransientRegistry(_)));
    }

    #[test]
    fn test_rollover_resets_counter_and_resyncs() {
        let h = harness("2024-01-01T22:00:00Z");
        h.authority.startup().unwrap();
        h.authority.commit(date("2024-01-01"), 7).unwrap();

        // Another process already issued one ticket on the new day.
        let d2 = date("2024-01-02");
        h.registry.seed(vec![ticket_on(d2, 1, "Early")]);
        h.clock.set_str("2024-01-02T07:00:00Z");

        let status = h.authority.ensure_current_day().unwrap();

        assert!(status.rolled_over);
        assert_eq!(status.counter, 1);
        assert_eq!(h.marker.current(), Some(d2));
    }

    #[test]
    fn test_day_check_is_cheap_when_current() {
        let h = harness("2024-01-01T09:00:00Z");
        h.authority.startup().unwrap();
        h.authority.commit(date("2024-01-01"), 4).unwrap();

        let status = h.authority.ensure_current_day().unwrap();
        assert!(!status.rolled_over);
        assert_eq!(status.counter, 4);
    }

    #[test]
    fn test_outage_during_rollover_leaves_marker_untouched() {
        let h = harness("2024-01-02T09:00:00Z");
        h.marker.set(Some(date("2024-01-01")));
        h.registry.set_unavailable(true);

        assert!(h.authority.ensure_current_day().is_err());
        assert_eq!(h.marker.current(), Some(date("2024-01-01")));

        h.registry.set_unavailable(false);
        let status = h.authority.ensure_current_day().unwrap();
        assert!(status.rolled_over);
        assert_eq!(h.marker.current(), Some(date("2024-01-02")));
    }

    #[test]
    fn test_marker_write_failure_is_a_warning() {
        let h = harness("2024-01-01T09:00:00Z");
        h.marker.fail_writes(true);

        let status = h.authority.ensure_current_day().unwrap();
        assert!(status.rolled_over);
        assert_eq!(status.warnings.len(), 1);
    }

    #[test]
    fn test_reset_clears_tickets_and_calls() {
        let h = harness("2024-01-01T09:00:00Z");
        let d = date("2024-01-01");
        h.authority.startup().unwrap();
        let tickets = vec![ticket_on(d, 1, "Asha"), ticket_on(d, 2, "Ben")];
        h.registry.seed(tickets.clone());
        h.authority.resync(d).unwrap();
        h.ledger
            .claim_next(&ClaimRequest {
                date: d,
                station_id: "room-1",
                candidates: &tickets,
                now: h.clock.now(),
            })
            .unwrap();

        let report = h.authority.reset(d, "admin").unwrap();

        assert_eq!(report.tickets_removed, 2);
        assert_eq!(report.calls_removed, 1);
        assert_eq!(h.authority.cached_counter().unwrap(), 0);
        assert_eq!(h.authority.next_sequence(d).unwrap(), 1);
        assert!(h.ledger.read(d).unwrap().snapshot.called_tokens.is_empty());
    }

    #[test]
    fn test_reset_past_date_ignores_wall_clock() {
        let h = harness("2024-01-05T09:00:00Z");
        let past = date("2024-01-01");
        h.registry.seed(vec![ticket_on(past, 1, "Asha")]);

        let report = h.authority.reset(past, "admin").unwrap();

        assert_eq!(report.tickets_removed, 1);
        assert_eq!(h.marker.current(), None);
        assert_eq!(h.authority.next_sequence(past).unwrap(), 1);
    }

    #[test]
    fn test_works_against_sqlite_registry() {
        let clock = Arc::new(FixedClock::at("2024-01-01T09:00:00Z"));
        let registry = Arc::new(SqliteRegistry::in_memory().unwrap());
        let authority = SequenceAuthority::new(
            registry.clone(),
            Arc::new(SqliteLedger::in_memory().unwrap()),
            Arc::new(MemoryDayMarker::new()),
            Calendar::with_offset_minutes(clock, 0),
        );

        let status = authority.startup().unwrap();
        let d = status.date;
        registry.append_ticket_row(d, &ticket_on(d, 1, "Asha")).unwrap();

        assert_eq!(authority.next_sequence(d).unwrap(), 2);
    }
}
