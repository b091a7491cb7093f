//! Call ledger: which tokens have been called, by whom, and when.
//!
//! Two backends share one contract:
//! - [`SqliteLedger`]: `BEGIN IMMEDIATE` transaction plus a `UNIQUE(date, token)` index.
//! - [`JsonFileLedger`]: lock-file scoped read-modify-write of a single JSON document.

mod json_file;
mod sqlite;
mod store;
mod types;

use std::path::Path;
use std::sync::Arc;

pub use json_file::JsonFileLedger;
pub use sqlite::SqliteLedger;
pub use store::{CallLedger, LedgerError};
pub use types::{
    select_unclaimed, CallRecord, ClaimOutcome, ClaimRequest, LedgerRead, LedgerSnapshot,
};

use crate::config::{LedgerBackend, LedgerConfig};

/// Open the ledger selected by configuration.
///
/// `database_path` is used by the sqlite backend, `config.json_path` by the
/// JSON-file backend.
pub fn create_ledger(
    config: &LedgerConfig,
    database_path: &Path,
) -> Result<Arc<dyn CallLedger>, LedgerError> {
    match config.backend {
        LedgerBackend::Sqlite => Ok(Arc::new(SqliteLedger::new(database_path)?)),
        LedgerBackend::JsonFile => Ok(Arc::new(JsonFileLedger::new(&config.json_path))),
    }
}
