//! SQLite-backed registry implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};

use super::{Registry, RegistryError, Ticket, ROW_SCHEMA_VERSION};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed registry.
///
/// One `tickets` table keyed by `(date, sequence_number)` plus a
/// `day_partitions` table recording which days have been opened.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Open (or create) the registry database at `path`.
    pub fn new(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory registry (useful for testing).
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RegistryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RegistryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS day_partitions (
                date TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                schema_version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                date TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                day TEXT NOT NULL,
                time TEXT NOT NULL,
                name TEXT NOT NULL,
                contact TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (date, sequence_number)
            );
            "#,
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RegistryError> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let date_str: String = row.get(0)?;
        let sequence_number: u32 = row.get(1)?;
        let day: String = row.get(2)?;
        let time: String = row.get(3)?;
        let name: String = row.get(4)?;
        let contact: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Ticket {
            date,
            day,
            time,
            name,
            contact,
            sequence_number,
            created_at,
        })
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn map_sqlite_error(e: rusqlite::Error) -> RegistryError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            RegistryError::Unavailable(e.to_string())
        }
        _ => RegistryError::Database(e.to_string()),
    }
}

impl Registry for SqliteRegistry {
    fn create_day_partition(&self, date: NaiveDate) -> Result<(), RegistryError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;

        tx.execute(
            "INSERT OR IGNORE INTO day_partitions (date, created_at, schema_version) VALUES (?, ?, ?)",
            params![date_key(date), Utc::now().to_rfc3339(), ROW_SCHEMA_VERSION],
        )
        .map_err(map_sqlite_error)?;

        tx.commit().map_err(map_sqlite_error)
    }

    fn append_ticket_row(&self, date: NaiveDate, row: &Ticket) -> Result<(), RegistryError> {
        if row.date != date {
            return Err(RegistryError::InvalidRow(format!(
                "ticket dated {} written to partition {}",
                row.date, date
            )));
        }
        if row.sequence_number == 0 {
            return Err(RegistryError::InvalidRow(
                "sequence numbers start at 1".to_string(),
            ));
        }

        let conn = self.lock()?;
        let key = date_key(date);

        let partition_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM day_partitions WHERE date = ?)",
                params![key],
                |r| r.get(0),
            )
            .map_err(map_sqlite_error)?;
        if !partition_exists {
            return Err(RegistryError::PartitionMissing(date));
        }

        let result = conn.execute(
            "INSERT INTO tickets (date, sequence_number, day, time, name, contact, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                key,
                row.sequence_number,
                row.day,
                row.time,
                row.name,
                row.contact,
                row.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(RegistryError::DuplicateSequence {
                    date,
                    sequence: row.sequence_number,
                })
            }
            Err(e) => Err(map_sqlite_error(e)),
        }
    }

    fn read_rows(&self, date: NaiveDate) -> Result<Vec<Ticket>, RegistryError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT date, sequence_number, day, time, name, contact, created_at FROM tickets WHERE date = ? ORDER BY sequence_number ASC",
            )
            .map_err(map_sqlite_error)?;

        let rows = stmt
            .query_map(params![date_key(date)], Self::row_to_ticket)
            .map_err(map_sqlite_error)?;

        let mut tickets = Vec::new();
        for row_result in rows {
            tickets.push(row_result.map_err(map_sqlite_error)?);
        }

        Ok(tickets)
    }

    fn count_rows(&self, date: NaiveDate) -> Result<u32, RegistryError> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE date = ?",
            params![date_key(date)],
            |row| row.get(0),
        )
        .map_err(map_sqlite_error)
    }

    fn find_row(&self, date: NaiveDate, sequence: u32) -> Result<Option<Ticket>, RegistryError> {
        let conn = self.lock()?;

        let result = conn.query_row(
            "SELECT date, sequence_number, day, time, name, contact, created_at FROM tickets WHERE date = ? AND sequence_number = ?",
            params![date_key(date), sequence],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sqlite_error(e)),
        }
    }

    fn clear_rows(&self, date: NaiveDate) -> Result<usize, RegistryError> {
        let conn = self.lock()?;

        conn.execute("DELETE FROM tickets WHERE date = ?", params![date_key(date)])
            .map_err(map_sqlite_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ticket(d: NaiveDate, seq: u32, name: &str) -> Ticket {
        Ticket {
            date: d,
            day: "Monday".to_string(),
            time: "09:00:00".to_string(),
            name: name.to_string(),
            contact: "555-0100".to_string(),
            sequence_number: seq,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_append_and_read_rows() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        registry.create_day_partition(d).unwrap();

        registry.append_ticket_row(d, &ticket(d, 2, "Bea")).unwrap();
        registry.append_ticket_row(d, &ticket(d, 1, "Ada")).unwrap();

        let rows = registry.read_rows(d).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Ada");
        assert_eq!(rows[1].name, "Bea");
        assert_eq!(registry.count_rows(d).unwrap(), 2);
    }

    #[test]
    fn test_create_partition_is_idempotent() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        registry.create_day_partition(d).unwrap();
        registry.append_ticket_row(d, &ticket(d, 1, "Ada")).unwrap();

        registry.create_day_partition(d).unwrap();
        assert_eq!(registry.count_rows(d).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        registry.create_day_partition(d).unwrap();
        registry.append_ticket_row(d, &ticket(d, 1, "Ada")).unwrap();

        let err = registry
            .append_ticket_row(d, &ticket(d, 1, "Bea"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateSequence { sequence: 1, .. }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_append_without_partition_fails() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        let err = registry
            .append_ticket_row(d, &ticket(d, 1, "Ada"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::PartitionMissing(_)));
    }

    #[test]
    fn test_row_date_must_match_partition() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        registry.create_day_partition(d).unwrap();
        let err = registry
            .append_ticket_row(d, &ticket(date("2024-01-02"), 1, "Ada"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRow(_)));
    }

    #[test]
    fn test_days_are_isolated() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d1 = date("2024-01-01");
        let d2 = date("2024-01-02");
        registry.create_day_partition(d1).unwrap();
        registry.create_day_partition(d2).unwrap();
        registry.append_ticket_row(d1, &ticket(d1, 1, "Ada")).unwrap();
        registry.append_ticket_row(d2, &ticket(d2, 1, "Bea")).unwrap();

        assert_eq!(registry.count_rows(d1).unwrap(), 1);
        assert_eq!(registry.find_row(d2, 1).unwrap().unwrap().name, "Bea");
        assert!(registry.find_row(d2, 2).unwrap().is_none());
    }

    #[test]
    fn test_clear_rows() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let d = date("2024-01-01");
        registry.create_day_partition(d).unwrap();
        registry.append_ticket_row(d, &ticket(d, 1, "Ada")).unwrap();
        registry.append_ticket_row(d, &ticket(d, 2, "Bea")).unwrap();

        assert_eq!(registry.clear_rows(d).unwrap(), 2);
        assert_eq!(registry.count_rows(d).unwrap(), 0);
        // Partition survives a clear.
        registry.append_ticket_row(d, &ticket(d, 1, "Cy")).unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("registry.db");
        let d = date("2024-01-01");
        {
            let registry = SqliteRegistry::new(&path).unwrap();
            registry.create_day_partition(d).unwrap();
            registry.append_ticket_row(d, &ticket(d, 1, "Ada")).unwrap();
        }
        let registry = SqliteRegistry::new(&path).unwrap();
        assert_eq!(registry.count_rows(d).unwrap(), 1);
    }
}
