//! SQLite-backed call ledger.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};

use super::{
    select_unclaimed, CallLedger, CallRecord, ClaimOutcome, ClaimRequest, LedgerError, LedgerRead,
    LedgerSnapshot,
};

/// Ledger stored in the service database.
///
/// Claims run inside a `BEGIN IMMEDIATE` transaction, and `UNIQUE(date, token)`
/// rejects a second record for the same token even if a foreign writer
/// bypasses the transaction.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS call_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                token INTEGER NOT NULL,
                station_id TEXT NOT NULL,
                name TEXT NOT NULL,
                time TEXT NOT NULL,
                called_at TEXT NOT NULL,
                UNIQUE (date, token)
            );

            CREATE INDEX IF NOT EXISTS idx_call_records_date ON call_records(date);

            CREATE TABLE IF NOT EXISTS ledger_versions (
                date TEXT PRIMARY KEY,
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Busy("ledger connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CallRecord> {
        let called_at_str: String = row.get(4)?;
        let called_at = DateTime::parse_from_rfc3339(&called_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(CallRecord {
            token: row.get(0)?,
            station_id: row.get(1)?,
            name: row.get(2)?,
            time: row.get(3)?,
            called_at,
        })
    }

    fn load_records(conn: &Connection, key: &str) -> Result<Vec<CallRecord>, LedgerError> {
        let mut stmt = conn
            .prepare(
                "SELECT token, station_id, name, time, called_at FROM call_records WHERE date = ? ORDER BY id ASC",
            )
            .map_err(map_sqlite_error)?;

        let rows = stmt
            .query_map(params![key], Self::row_to_record)
            .map_err(map_sqlite_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(map_sqlite_error)?);
        }
        Ok(records)
    }

    fn load_version(conn: &Connection, key: &str) -> Result<u64, LedgerError> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM ledger_versions WHERE date = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_error)?;
        Ok(version.unwrap_or(0).max(0) as u64)
    }

    fn bump_version(tx: &Transaction<'_>, key: &str) -> Result<u64, LedgerError> {
        tx.execute(
            "INSERT INTO ledger_versions (date, version) VALUES (?, 1)
             ON CONFLICT(date) DO UPDATE SET version = version + 1",
            params![key],
        )
        .map_err(map_sqlite_error)?;
        Self::load_version(tx, key)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn map_sqlite_error(e: rusqlite::Error) -> LedgerError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            LedgerError::Conflict(e.to_string())
        }
        Some(ErrorCode::ConstraintViolation) => LedgerError::Conflict(e.to_string()),
        _ => LedgerError::Database(e.to_string()),
    }
}

impl CallLedger for SqliteLedger {
    fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<ClaimOutcome, LedgerError> {
        let mut conn = self.lock()?;
        let key = date_key(request.date);

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;

        let called: HashSet<u32> = {
            let mut stmt = tx
                .prepare("SELECT token FROM call_records WHERE date = ?")
                .map_err(map_sqlite_error)?;
            let rows = stmt
                .query_map(params![key], |row| row.get::<_, u32>(0))
                .map_err(map_sqlite_error)?;
            let mut called = HashSet::new();
            for row in rows {
                called.insert(row.map_err(map_sqlite_error)?);
            }
            called
        };

        let Some(ticket) = select_unclaimed(request.candidates, |t| called.contains(&t)) else {
            let version = Self::load_version(&tx, &key)?;
            return Ok(ClaimOutcome {
                record: None,
                version,
                warning: None,
            });
        };

        let record = CallRecord::for_ticket(ticket, request.station_id, request.now);
        tx.execute(
            "INSERT INTO call_records (date, token, station_id, name, time, called_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                key,
                record.token,
                record.station_id,
                record.name,
                record.time,
                record.called_at.to_rfc3339(),
            ],
        )
        .map_err(map_sqlite_error)?;

        let version = Self::bump_version(&tx, &key)?;
        tx.commit().map_err(map_sqlite_error)?;

        Ok(ClaimOutcome {
            record: Some(record),
            version,
            warning: None,
        })
    }

    fn read(&self, date: NaiveDate) -> Result<LedgerRead, LedgerError> {
        let conn = self.lock()?;
        let key = date_key(date);

        let records = Self::load_records(&conn, &key)?;
        let version = Self::load_version(&conn, &key)?;

        Ok(LedgerRead {
            snapshot: LedgerSnapshot {
                version,
                date: Some(date),
                called_tokens: records,
            },
            warning: None,
        })
    }

    fn clear(&self, date: NaiveDate) -> Result<usize, LedgerError> {
        let mut conn = self.lock()?;
        let key = date_key(date);

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;
        let removed = tx
            .execute("DELETE FROM call_records WHERE date = ?", params![key])
            .map_err(map_sqlite_error)?;
        Self::bump_version(&tx, &key)?;
        tx.commit().map_err(map_sqlite_error)?;

        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{ticket_on, tickets_on};
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_claims_in_issuance_order() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let tickets = tickets_on(day(), &["Asha", "Ben"]);
        let now = Utc::now();

        let first = ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now,
            })
            .unwrap();
        let second = ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-2",
                candidates: &tickets,
                now,
            })
            .unwrap();

        assert_eq!(first.record.unwrap().token, 1);
        let second = second.record.unwrap();
        assert_eq!(second.token, 2);
        assert_eq!(second.station_id, "room-2");
        assert_eq!(second.name, "Ben");
    }

    #[test]
    fn test_claim_on_exhausted_queue_returns_none() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let tickets = vec![ticket_on(day(), 1, "Asha")];
        let request = ClaimRequest {
            date: day(),
            station_id: "room-1",
            candidates: &tickets,
            now: Utc::now(),
        };

        assert!(ledger.claim_next(&request).unwrap().record.is_some());
        let outcome = ledger.claim_next(&request).unwrap();
        assert!(outcome.record.is_none());
        assert_eq!(outcome.version, 1);
    }

    #[test]
    fn test_read_is_scoped_by_date() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let other = day().succ_opt().unwrap();
        let tickets = vec![ticket_on(day(), 1, "Asha")];
        ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now: Utc::now(),
            })
            .unwrap();

        assert_eq!(ledger.read(day()).unwrap().snapshot.called_tokens.len(), 1);
        let read = ledger.read(other).unwrap();
        assert!(read.snapshot.called_tokens.is_empty());
        assert_eq!(read.snapshot.version, 0);
    }

    #[test]
    fn test_clear_removes_records_and_bumps_version() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let tickets = tickets_on(day(), &["Asha", "Ben"]);
        for station in ["room-1", "room-2"] {
            ledger
                .claim_next(&ClaimRequest {
                    date: day(),
                    station_id: station,
                    candidates: &tickets,
                    now: Utc::now(),
                })
                .unwrap();
        }

        assert_eq!(ledger.clear(day()).unwrap(), 2);
        let read = ledger.read(day()).unwrap();
        assert!(read.snapshot.called_tokens.is_empty());
        assert_eq!(read.snapshot.version, 3);
    }

    #[test]
    fn test_concurrent_claims_never_share_a_token() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ledger.db");
        let tickets = Arc::new(tickets_on(day(), &["A", "B", "C", "D", "E", "F"]));

        // Separate connections behave like separate processes.
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let path = path.clone();
                let tickets = tickets.clone();
                std::thread::spawn(move || {
                    let ledger = SqliteLedger::new(&path).unwrap();
                    let station = format!("room-{}", i);
                    let mut won = Vec::new();
                    for _ in 0..2 {
                        loop {
                            match ledger.claim_next(&ClaimRequest {
                                date: day(),
                                station_id: &station,
                                candidates: &tickets,
                                now: Utc::now(),
                            }) {
                                Ok(outcome) => {
                                    if let Some(record) = outcome.record {
                                        won.push(record.token);
                                    }
                                    break;
                                }
                                Err(e) if e.is_retryable() => continue,
                                Err(e) => panic!("unexpected error: {}", e),
                            }
                        }
                    }
                    won
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }
}
