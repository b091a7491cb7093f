//! Registry row types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Version of the named row schema written by this crate.
///
/// Columns: `Date, Day, Time, Name, Contact, SequenceNumber`.
pub const ROW_SCHEMA_VERSION: u32 = 1;

/// An issued ticket, as stored in the registry.
///
/// `(date, sequence_number)` is unique. Rows are never mutated; they only
/// disappear through an explicit day reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    /// Day partition the ticket belongs to.
    pub date: NaiveDate,
    /// Weekday name at issuance (e.g. "Monday").
    pub day: String,
    /// Local issuance time, `HH:MM:SS`.
    pub time: String,
    /// Candidate name.
    pub name: String,
    /// Candidate contact (phone number).
    pub contact: String,
    /// Per-day sequence number, starting at 1. Doubles as the called token.
    pub sequence_number: u32,
    /// Exact issuance instant.
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// The externally visible token for this ticket.
    pub fn token(&self) -> u32 {
        self.sequence_number
    }
}
