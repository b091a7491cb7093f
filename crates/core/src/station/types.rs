use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{CallRecord, LedgerError};
use crate::registry::RegistryError;

/// The token a station is currently serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalledToken {
    pub date: NaiveDate,
    pub token: u32,
    pub name: String,
    /// Ticket issuance time, `HH:MM:SS`.
    pub time: String,
    pub called_at: DateTime<Utc>,
}

impl CalledToken {
    pub fn from_record(date: NaiveDate, record: &CallRecord) -> Self {
        Self {
            date,
            token: record.token,
            name: record.name.clone(),
            time: record.time.clone(),
            called_at: record.called_at,
        }
    }
}

/// In-memory state of one interview room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationState {
    pub station_id: String,
    pub label: String,
    pub is_open: bool,
    pub current_token: Option<CalledToken>,
}

/// What `call_next` produced.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallResult {
    Called {
        record: CallRecord,
        /// Claims attempted, including lost races.
        attempts: u32,
    },
    QueueEmpty,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallReport {
    #[serde(flatten)]
    pub outcome: CallResult,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "result", content = "token", rename_all = "snake_case")]
pub enum RecallOutcome {
    Recalled(CalledToken),
    NothingToRecall,
}

#[derive(Debug, Error)]
pub enum StationError {
    #[error("Station {0} is closed")]
    Closed(String),

    #[error("Unknown station: {0}")]
    NotFound(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Every claim attempt lost a race or found the ledger locked.
    #[error("Could not claim a token after {attempts} attempts")]
    ClaimContention { attempts: u32 },
}
