use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Issuance
    TicketIssued {
        date: NaiveDate,
        sequence_number: u32,
        name: String,
        issued_by: String,
        /// Appends rejected as duplicates before this one succeeded.
        conflicts: u32,
    },
    TicketIssueFailed {
        date: NaiveDate,
        issued_by: String,
        reason: String,
    },
    VoucherFailed {
        date: NaiveDate,
        sequence_number: u32,
        error: String,
    },

    // Day lifecycle
    DayRolledOver {
        previous: Option<NaiveDate>,
        date: NaiveDate,
        /// Tickets already present in the registry for the new day.
        resynced_count: u32,
    },
    DayReset {
        date: NaiveDate,
        reset_by: String,
        tickets_removed: usize,
        calls_removed: usize,
    },

    // Stations
    StationOpened {
        station_id: String,
        opened_by: String,
    },
    StationClosed {
        station_id: String,
        closed_by: String,
    },
    TokenCalled {
        station_id: String,
        date: NaiveDate,
        token: u32,
        name: String,
        called_by: String,
        attempts: u32,
    },
    QueueEmpty {
        station_id: String,
        date: NaiveDate,
    },
    ClaimConflict {
        station_id: String,
        date: NaiveDate,
        attempt: u32,
        error: String,
    },

    // Local state recovery
    LedgerRecovered {
        backend: String,
        detail: String,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::TicketIssued { .. } => "ticket_issued",
            Self::TicketIssueFailed { .. } => "ticket_issue_failed",
            Self::VoucherFailed { .. } => "voucher_failed",
            Self::DayRolledOver { .. } => "day_rolled_over",
            Self::DayReset { .. } => "day_reset",
            Self::StationOpened { .. } => "station_opened",
            Self::StationClosed { .. } => "station_closed",
            Self::TokenCalled { .. } => "token_called",
            Self::QueueEmpty { .. } => "queue_empty",
            Self::ClaimConflict { .. } => "claim_conflict",
            Self::LedgerRecovered { .. } => "ledger_recovered",
        }
    }

    /// Station the event concerns, if any.
    pub fn station_id(&self) -> Option<&str> {
        match self {
            Self::StationOpened { station_id, .. }
            | Self::StationClosed { station_id, .. }
            | Self::TokenCalled { station_id, .. }
            | Self::QueueEmpty { station_id, .. }
            | Self::ClaimConflict { station_id, .. } => Some(station_id),
            _ => None,
        }
    }

    /// Day partition the event concerns, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::TicketIssued { date, .. }
            | Self::TicketIssueFailed { date, .. }
            | Self::VoucherFailed { date, .. }
            | Self::DayRolledOver { date, .. }
            | Self::DayReset { date, .. }
            | Self::TokenCalled { date, .. }
            | Self::QueueEmpty { date, .. }
            | Self::ClaimConflict { date, .. } => Some(*date),
            _ => None,
        }
    }

    /// Operator who triggered the event, if any.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::TicketIssued { issued_by, .. } | Self::TicketIssueFailed { issued_by, .. } => {
                Some(issued_by)
            }
            Self::DayReset { reset_by, .. } => Some(reset_by),
            Self::StationOpened { opened_by, .. } => Some(opened_by),
            Self::StationClosed { closed_by, .. } => Some(closed_by),
            Self::TokenCalled { called_by, .. } => Some(called_by),
            _ => None,
        }
    }
}

/// A stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub station_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub actor: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Build an unsaved record (id 0) from an event.
    pub fn from_event(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            station_id: event.station_id().map(String::from),
            date: event.date(),
            actor: event.actor().map(String::from),
            data: event,
        }
    }
}
