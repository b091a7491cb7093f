use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Where a board entry's name came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Live registry lookup by `(date, token)`.
    Registry,
    /// Name captured in the call record.
    Snapshot,
}

/// Latest call for one station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardEntry {
    pub station_id: String,
    pub label: String,
    pub token: u32,
    pub name: String,
    pub name_source: NameSource,
    /// Ticket issuance time.
    pub time: String,
    pub called_at: DateTime<Utc>,
    /// On/off phase while a change highlight runs, `None` otherwise.
    pub highlighted: Option<bool>,
}

/// A token present in more than one call record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateCall {
    pub token: u32,
    pub station_ids: Vec<String>,
}

/// What every display shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    pub date: NaiveDate,
    /// Ledger version the board was built from.
    pub ledger_version: u64,
    /// One entry per station that has called today, most recent first.
    pub entries: Vec<BoardEntry>,
    pub anomalies: Vec<DuplicateCall>,
    pub polled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Raised when a station's latest token changes between polls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub station_id: String,
    pub label: String,
    pub token: u32,
    pub name: String,
    pub highlight_cycles: u32,
    pub highlight_interval_ms: u64,
    pub chime: bool,
    pub raised_at: DateTime<Utc>,
}

/// Alternating highlight that runs for a fixed number of intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub started_at: DateTime<Utc>,
    pub cycles: u32,
    pub interval_ms: u64,
}

impl Highlight {
    /// `Some(true)` on even intervals, `Some(false)` on odd ones, `None` once finished.
    pub fn phase_at(&self, now: DateTime<Utc>) -> Option<bool> {
        if self.interval_ms == 0 {
            return None;
        }
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as u64;
        let k = elapsed / self.interval_ms;
        if k >= u64::from(self.cycles) {
            None
        } else {
            Some(k % 2 == 0)
        }
    }
}

/// Result of one aggregator poll.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub board: Board,
    pub notifications: Vec<Notification>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_highlight_alternates_then_stops() {
        let start = Utc::now();
        let h = Highlight {
            started_at: start,
            cycles: 6,
            interval_ms: 500,
        };

        assert_eq!(h.phase_at(start), Some(true));
        assert_eq!(h.phase_at(start + Duration::milliseconds(499)), Some(true));
        assert_eq!(h.phase_at(start + Duration::milliseconds(500)), Some(false));
        assert_eq!(h.phase_at(start + Duration::milliseconds(1000)), Some(true));
        assert_eq!(h.phase_at(start + Duration::milliseconds(2999)), Some(false));
        assert_eq!(h.phase_at(start + Duration::milliseconds(3000)), None);
    }

    #[test]
    fn test_highlight_before_start_counts_as_first_phase() {
        let start = Utc::now();
        let h = Highlight {
            started_at: start,
            cycles: 2,
            interval_ms: 100,
        };
        assert_eq!(h.phase_at(start - Duration::seconds(1)), Some(true));
    }
}
