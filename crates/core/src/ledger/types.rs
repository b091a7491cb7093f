use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::Ticket;

/// One "token called by station S at time T" entry.
///
/// Append-only: records are never edited, only dropped wholesale by a day reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRecord {
    pub token: u32,
    /// Candidate name as it was when the call was made.
    pub name: String,
    pub station_id: String,
    /// Issuance time of the ticket, `HH:MM:SS`.
    pub time: String,
    pub called_at: DateTime<Utc>,
}

/// Persisted ledger layout for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    /// Bumped on every mutation.
    pub version: u64,
    /// Day the records belong to. `None` for a fresh ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub called_tokens: Vec<CallRecord>,
}

impl LedgerSnapshot {
    /// Empty snapshot scoped to `date`.
    pub fn empty(date: NaiveDate, version: u64) -> Self {
        Self {
            version,
            date: Some(date),
            called_tokens: Vec::new(),
        }
    }

    /// Whether `token` has already been called.
    pub fn is_called(&self, token: u32) -> bool {
        self.called_tokens.iter().any(|r| r.token == token)
    }
}

/// Input to an atomic claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest<'a> {
    pub date: NaiveDate,
    pub station_id: &'a str,
    /// The day's tickets in issuance order.
    pub candidates: &'a [Ticket],
    pub now: DateTime<Utc>,
}

/// Result of an atomic claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// The appended record, or `None` when every candidate was already called.
    pub record: Option<CallRecord>,
    /// Ledger version after the claim.
    pub version: u64,
    /// Set when the backend had to recover from a corrupt state.
    pub warning: Option<String>,
}

/// Result of a ledger read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRead {
    pub snapshot: LedgerSnapshot,
    pub warning: Option<String>,
}

/// First candidate whose token is not called yet, in issuance order.
///
/// Both backends feed their own view of the called-set through `is_called`.
pub fn select_unclaimed<'t, F>(candidates: &'t [Ticket], is_called: F) -> Option<&'t Ticket>
where
    F: Fn(u32) -> bool,
{
    candidates.iter().find(|t| !is_called(t.token()))
}

impl CallRecord {
    /// Build the record for `ticket` being called by `station_id` at `now`.
    pub fn for_ticket(ticket: &Ticket, station_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            token: ticket.token(),
            name: ticket.name.clone(),
            station_id: station_id.to_string(),
            time: ticket.time.clone(),
            called_at: now,
        }
    }
}
