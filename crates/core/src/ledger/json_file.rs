//! JSON-file call ledger.
//!
//! The whole ledger lives in one document:
//!
//! ```json
//! { "version": 4, "date": "2024-01-01", "called_tokens": [ { "token": 1, ... } ] }
//! ```
//!
//! Every mutation happens under an exclusive `<path>.lock` file created with
//! `create_new`, and the document is replaced through a temp file + rename.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{NaiveDate, Utc};
use tracing::warn;

use super::{
    select_unclaimed, CallLedger, CallRecord, ClaimOutcome, ClaimRequest, LedgerError, LedgerRead,
    LedgerSnapshot,
};

/// A lock older than this is assumed to belong to a crashed writer.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling_path(&self.path, ".lock")
    }

    fn read_document(&self) -> Result<Document, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::Missing),
            Err(e) => return Err(LedgerError::Io(e.to_string())),
        };

        if content.trim().is_empty() {
            return Ok(Document::Missing);
        }

        Ok(match serde_json::from_str::<LedgerSnapshot>(&content) {
            Ok(snapshot) => Document::Parsed(snapshot),
            Err(e) => Document::Corrupt(e.to_string()),
        })
    }

    /// Load the document for a writer holding the lock. A corrupt file is
    /// moved aside and reported.
    fn load_locked(&self) -> Result<(LedgerSnapshot, Option<String>), LedgerError> {
        let parse_err = match self.read_document()? {
            Document::Missing => return Ok((LedgerSnapshot::default(), None)),
            Document::Parsed(snapshot) => return Ok((snapshot, None)),
            Document::Corrupt(parse_err) => parse_err,
        };

        let aside = sibling_path(
            &self.path,
            &format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")),
        );
        fs::rename(&self.path, &aside).map_err(|e| {
            LedgerError::Corrupt(format!(
                "{} is unreadable ({}) and could not be moved aside: {}",
                self.path.display(),
                parse_err,
                e
            ))
        })?;
        let message = format!(
            "ledger file {} was unreadable ({}); moved to {} and started empty",
            self.path.display(),
            parse_err,
            aside.display()
        );
        warn!(path = %self.path.display(), aside = %aside.display(), "Recovered corrupt ledger file");
        Ok((LedgerSnapshot::default(), Some(message)))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        let json =
            serde_json::to_string_pretty(snapshot).map_err(|e| LedgerError::Io(e.to_string()))?;
        let tmp = sibling_path(&self.path, ".tmp");
        fs::write(&tmp, json).map_err(|e| LedgerError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::Io(e.to_string()))
    }

    /// Run one lock-scoped mutation. The mutator returns `(value, changed)`;
    /// the document is only written back when `changed` is true.
    fn mutate<T, F>(&self, mutator: F) -> Result<(T, Option<String>), LedgerError>
    where
        F: FnOnce(&mut LedgerSnapshot) -> (T, bool),
    {
        let _guard = LockGuard::acquire(&self.lock_path())?;
        let (mut snapshot, warning) = self.load_locked()?;
        let (value, changed) = mutator(&mut snapshot);
        if changed || warning.is_some() {
            self.save(&snapshot)?;
        }
        Ok((value, warning))
    }
}

enum Document {
    Missing,
    Parsed(LedgerSnapshot),
    /// Unparseable content, with the parse error.
    Corrupt(String),
}

/// Scope the document to `date`, starting a fresh day when it holds another one.
fn roll_to(snapshot: &mut LedgerSnapshot, date: NaiveDate) -> bool {
    if snapshot.date == Some(date) {
        return false;
    }
    let version = snapshot.version;
    *snapshot = LedgerSnapshot::empty(date, version);
    true
}

impl CallLedger for JsonFileLedger {
    fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<ClaimOutcome, LedgerError> {
        let ((record, version), warning) = self.mutate(|snapshot| {
            let rolled = roll_to(snapshot, request.date);
            let record = select_unclaimed(request.candidates, |t| snapshot.is_called(t))
                .map(|ticket| CallRecord::for_ticket(ticket, request.station_id, request.now));
            if let Some(ref record) = record {
                snapshot.called_tokens.push(record.clone());
            }
            let changed = rolled || record.is_some();
            if changed {
                snapshot.version += 1;
            }
            ((record, snapshot.version), changed)
        })?;

        Ok(ClaimOutcome {
            record,
            version,
            warning,
        })
    }

    fn read(&self, date: NaiveDate) -> Result<LedgerRead, LedgerError> {
        // Readers skip the lock and never touch the file; rename keeps the
        // document whole, and recovery is left to the next locked writer.
        let (snapshot, warning) = match self.read_document()? {
            Document::Missing => (LedgerSnapshot::default(), None),
            Document::Parsed(snapshot) => (snapshot, None),
            Document::Corrupt(parse_err) => {
                warn!(path = %self.path.display(), "Ledger file is unreadable: {}", parse_err);
                let message = format!(
                    "ledger file {} is unreadable ({}); the next call will move it aside",
                    self.path.display(),
                    parse_err
                );
                (LedgerSnapshot::default(), Some(message))
            }
        };

        let snapshot = if snapshot.date == Some(date) {
            snapshot
        } else {
            LedgerSnapshot::empty(date, snapshot.version)
        };

        Ok(LedgerRead { snapshot, warning })
    }

    fn clear(&self, date: NaiveDate) -> Result<usize, LedgerError> {
        let (removed, _) = self.mutate(|snapshot| {
            // The document only ever holds one day; another day's records stay.
            if snapshot.date != Some(date) {
                return (0, false);
            }
            let removed = snapshot.called_tokens.len();
            *snapshot = LedgerSnapshot::empty(date, snapshot.version + 1);
            (removed, true)
        })?;
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "json_file"
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

struct LockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl LockGuard {
    fn acquire(lock_path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LedgerError::Io(e.to_string()))?;
            }
        }

        match Self::try_create(lock_path) {
            Err(LedgerError::Busy(_)) if is_stale(lock_path) => Self::take_over(lock_path),
            other => other,
        }
    }

    /// Replace a stale lock. Competing takeovers serialise on a second
    /// `create_new` file, and staleness is checked again under it, so a lock
    /// another process has just created is never removed.
    fn take_over(lock_path: &Path) -> Result<Self, LedgerError> {
        let takeover_path = sibling_path(lock_path, ".takeover");
        let takeover = match Self::try_create(&takeover_path) {
            Ok(guard) => guard,
            Err(LedgerError::Busy(_)) => {
                // Left behind by a process that died mid-takeover.
                if is_stale(&takeover_path) {
                    let _ = fs::remove_file(&takeover_path);
                }
                return Err(LedgerError::Busy(lock_path.display().to_string()));
            }
            Err(e) => return Err(e),
        };

        let result = if is_stale(lock_path) {
            warn!(lock = %lock_path.display(), "Removing stale ledger lock");
            let _ = fs::remove_file(lock_path);
            Self::try_create(lock_path)
        } else {
            Err(LedgerError::Busy(lock_path.display().to_string()))
        };
        drop(takeover);
        result
    }

    fn try_create(lock_path: &Path) -> Result<Self, LedgerError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path: lock_path.to_path_buf(),
                    _file: file,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LedgerError::Busy(lock_path.display().to_string()))
            }
            Err(e) => Err(LedgerError::Io(format!(
                "failed to acquire {}: {}",
                lock_path.display(),
                e
            ))),
        }
    }
}

fn is_stale(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AFTER)
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::tickets_on;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn request<'a>(tickets: &'a [crate::registry::Ticket], station: &'a str) -> ClaimRequest<'a> {
        ClaimRequest {
            date: day(),
            station_id: station,
            candidates: tickets,
            now: Utc::now(),
        }
    }

    fn ledger_in(dir: &TempDir) -> JsonFileLedger {
        JsonFileLedger::new(dir.path().join("queue_state.json"))
    }

    #[test]
    fn test_claim_writes_document() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let tickets = tickets_on(day(), &["Asha", "Ben"]);

        let outcome = ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(outcome.record.unwrap().token, 1);
        assert!(outcome.warning.is_none());

        let raw = fs::read_to_string(ledger.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["called_tokens"][0]["token"], 1);
        assert_eq!(doc["called_tokens"][0]["station_id"], "room-1");
        assert!(doc["version"].as_u64().unwrap() >= 1);
        assert!(!ledger.lock_path().exists());
    }

    #[test]
    fn test_second_claim_gets_next_token() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let tickets = tickets_on(day(), &["Asha", "Ben"]);

        ledger.claim_next(&request(&tickets, "room-1")).unwrap();
        let second = ledger.claim_next(&request(&tickets, "room-2")).unwrap();
        assert_eq!(second.record.unwrap().token, 2);
        let third = ledger.claim_next(&request(&tickets, "room-1")).unwrap();
        assert!(third.record.is_none());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "{not json").unwrap();
        let tickets = tickets_on(day(), &["Asha"]);

        let outcome = ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now: Utc::now(),
            })
            .unwrap();

        assert_eq!(outcome.record.unwrap().token, 1);
        assert!(outcome.warning.unwrap().contains("moved to"));
        let aside = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(aside);
    }

    #[test]
    fn test_other_date_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let tickets = tickets_on(day(), &["Asha"]);
        ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now: Utc::now(),
            })
            .unwrap();

        let next_day = day().succ_opt().unwrap();
        assert!(ledger.read(next_day).unwrap().snapshot.called_tokens.is_empty());
        assert_eq!(ledger.read(day()).unwrap().snapshot.called_tokens.len(), 1);

        // A claim on the new day starts from an empty called set.
        let new_tickets = tickets_on(next_day, &["Ben"]);
        let outcome = ledger
            .claim_next(&ClaimRequest {
                date: next_day,
                station_id: "room-1",
                candidates: &new_tickets,
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(outcome.record.unwrap().token, 1);
    }

    #[test]
    fn test_busy_lock_is_reported() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.lock_path(), "pid=1").unwrap();
        let tickets = tickets_on(day(), &["Asha"]);

        let err = ledger
            .claim_next(&ClaimRequest {
                date: day(),
                station_id: "room-1",
                candidates: &tickets,
                now: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Busy(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
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
        assert!(ledger.read(day()).unwrap().snapshot.called_tokens.is_empty());
    }

    #[test]
    fn test_clear_of_another_day_keeps_today() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let tickets = tickets_on(day(), &["Asha", "Ben"]);
        ledger.claim_next(&request(&tickets, "room-1")).unwrap();

        let yesterday = day().pred_opt().unwrap();
        assert_eq!(ledger.clear(yesterday).unwrap(), 0);

        assert_eq!(ledger.read(day()).unwrap().snapshot.called_tokens.len(), 1);
        let next = ledger.claim_next(&request(&tickets, "room-2")).unwrap();
        assert_eq!(next.record.unwrap().token, 2);
    }

    #[test]
    fn test_read_reports_corrupt_file_without_moving_it() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "{ not json").unwrap();
        let has_aside = || {
            fs::read_dir(dir.path())
                .unwrap()
                .filter_map(Result::ok)
                .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        };

        let read = ledger.read(day()).unwrap();
        assert!(read.snapshot.called_tokens.is_empty());
        assert!(read.warning.unwrap().contains("unreadable"));
        assert!(ledger.path().exists());
        assert!(!has_aside());

        // The next writer does the recovery and reports it.
        let tickets = tickets_on(day(), &["Asha"]);
        let outcome = ledger.claim_next(&request(&tickets, "room-1")).unwrap();
        assert!(outcome.warning.unwrap().contains("moved to"));
        assert!(has_aside());
    }

    fn age(path: &Path) {
        OpenOptions::new()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.lock_path(), "pid=1").unwrap();
        age(&ledger.lock_path());
        let tickets = tickets_on(day(), &["Asha"]);

        let outcome = ledger.claim_next(&request(&tickets, "room-1")).unwrap();

        assert_eq!(outcome.record.unwrap().token, 1);
        assert!(!ledger.lock_path().exists());
        assert!(!sibling_path(&ledger.lock_path(), ".takeover").exists());
    }

    #[test]
    fn test_takeover_in_progress_reports_busy() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let lock = ledger.lock_path();
        fs::write(&lock, "pid=1").unwrap();
        age(&lock);
        // Another process is mid-takeover.
        fs::write(sibling_path(&lock, ".takeover"), "pid=2").unwrap();
        let tickets = tickets_on(day(), &["Asha"]);

        let err = ledger.claim_next(&request(&tickets, "room-1")).unwrap_err();

        assert!(matches!(err, LedgerError::Busy(_)));
        assert!(lock.exists());
        assert!(sibling_path(&lock, ".takeover").exists());
    }
}
