use chrono::NaiveDate;
use thiserror::Error;

use super::{ClaimOutcome, ClaimRequest, LedgerRead};

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Another writer claimed concurrently. Re-read and retry.
    #[error("Claim conflict: {0}")]
    Conflict(String),

    /// The ledger lock is held by someone else.
    #[error("Ledger busy: {0}")]
    Busy(String),

    /// Local state is unreadable and could not be set aside.
    #[error("Ledger corrupt: {0}")]
    Corrupt(String),

    #[error("Ledger I/O error: {0}")]
    Io(String),

    #[error("Ledger database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Whether a fresh read followed by another claim may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_) | LedgerError::Busy(_))
    }
}

/// Shared record of called tokens.
///
/// Every operation is scoped to one day. Implementations must make
/// `claim_next` atomic: read the called set, pick the first unclaimed
/// candidate and append its record in one step.
pub trait CallLedger: Send + Sync {
    /// Atomically claim the first uncalled candidate.
    fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<ClaimOutcome, LedgerError>;

    /// Read every record for `date`, in append order.
    fn read(&self, date: NaiveDate) -> Result<LedgerRead, LedgerError>;

    /// Drop every record for `date`. Returns how many were removed.
    fn clear(&self, date: NaiveDate) -> Result<usize, LedgerError>;

    /// Short backend name for logs and `/config`.
    fn backend_name(&self) -> &'static str;
}
