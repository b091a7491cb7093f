//! Registry storage trait and error type.

use chrono::NaiveDate;
use thiserror::Error;

use super::Ticket;

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store could not be reached. Retry later.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Storage-level failure.
    #[error("Registry database error: {0}")]
    Database(String),

    /// Another writer already recorded this sequence number for the day.
    #[error("Sequence {sequence} already issued for {date}")]
    DuplicateSequence { date: NaiveDate, sequence: u32 },

    /// Rows were written before the day partition was created.
    #[error("No day partition for {0}")]
    PartitionMissing(NaiveDate),

    /// The row does not belong to the partition it was written to.
    #[error("Invalid ticket row: {0}")]
    InvalidRow(String),
}

impl RegistryError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_) | RegistryError::Database(_))
    }
}

/// Durable, append-only store of issued tickets, partitioned by day.
///
/// Any store satisfying this contract can back the queue (sqlite, a
/// key-value store, a spreadsheet API).
pub trait Registry: Send + Sync {
    /// Create the partition for `date`. Idempotent, safe under racing callers.
    fn create_day_partition(&self, date: NaiveDate) -> Result<(), RegistryError>;

    /// Append one ticket row to the partition for `date`.
    fn append_ticket_row(&self, date: NaiveDate, row: &Ticket) -> Result<(), RegistryError>;

    /// All rows for `date`, in issuance order.
    fn read_rows(&self, date: NaiveDate) -> Result<Vec<Ticket>, RegistryError>;

    /// Number of rows recorded for `date`.
    fn count_rows(&self, date: NaiveDate) -> Result<u32, RegistryError>;

    /// Look up one ticket by its token.
    fn find_row(&self, date: NaiveDate, sequence: u32) -> Result<Option<Ticket>, RegistryError>;

    /// Remove every row for `date`, keeping the partition itself.
    /// Returns the number of rows removed.
    fn clear_rows(&self, date: NaiveDate) -> Result<usize, RegistryError>;
}
