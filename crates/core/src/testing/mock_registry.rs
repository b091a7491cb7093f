//! In-memory registry with failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::registry::{Registry, RegistryError, Ticket};

#[derive(Default)]
struct Inner {
    partitions: HashSet<NaiveDate>,
    rows: BTreeMap<NaiveDate, Vec<Ticket>>,
    unavailable: bool,
    forced_conflicts: u32,
    next_append_error: Option<RegistryError>,
    append_calls: u32,
}

/// Mock implementation of the [`Registry`] trait.
///
/// - `set_unavailable(true)` makes every call fail with `Unavailable`
/// - `force_conflicts(n)` makes the next `n` appends lose a race: a foreign
///   row is written at the requested number and `DuplicateSequence` returned
/// - `fail_next_append(err)` fails exactly one append
///
/// # Example
///
/// ```rust,ignore
/// let registry = MockRegistry::new();
/// registry.set_unavailable(true);
/// assert!(registry.count_rows(today).is_err());
/// ```
pub struct MockRegistry {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRegistry")
            .field("inner", &"<rows>")
            .finish()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn force_conflicts(&self, n: u32) {
        self.lock().forced_conflicts = n;
    }

    pub fn fail_next_append(&self, error: RegistryError) {
        self.lock().next_append_error = Some(error);
    }

    /// Insert rows directly, creating their partitions.
    pub fn seed(&self, tickets: Vec<Ticket>) {
        let mut inner = self.lock();
        for ticket in tickets {
            inner.partitions.insert(ticket.date);
            inner.rows.entry(ticket.date).or_default().push(ticket);
        }
    }

    /// Rows for `date`, in sequence order.
    pub fn rows(&self, date: NaiveDate) -> Vec<Ticket> {
        let mut rows = self.lock().rows.get(&date).cloned().unwrap_or_default();
        rows.sort_by_key(|t| t.sequence_number);
        rows
    }

    pub fn has_partition(&self, date: NaiveDate) -> bool {
        self.lock().partitions.contains(&date)
    }

    pub fn append_calls(&self) -> u32 {
        self.lock().append_calls
    }

    fn check_available(inner: &Inner) -> Result<(), RegistryError> {
        if inner.unavailable {
            Err(RegistryError::Unavailable("mock registry offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Registry for MockRegistry {
    fn create_day_partition(&self, date: NaiveDate) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner.partitions.insert(date);
        Ok(())
    }

    fn append_ticket_row(&self, date: NaiveDate, row: &Ticket) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        inner.append_calls += 1;
        Self::check_available(&inner)?;

        if let Some(error) = inner.next_append_error.take() {
            return Err(error);
        }
        if !inner.partitions.contains(&date) {
            return Err(RegistryError::PartitionMissing(date));
        }

        let sequence = row.sequence_number;
        let taken = inner
            .rows
            .get(&date)
            .is_some_and(|rows| rows.iter().any(|t| t.sequence_number == sequence));

        if !taken && inner.forced_conflicts > 0 {
            inner.forced_conflicts -= 1;
            let mut foreign = row.clone();
            foreign.name = format!("foreign-{}", sequence);
            inner.rows.entry(date).or_default().push(foreign);
            return Err(RegistryError::DuplicateSequence { date, sequence });
        }
        if taken {
            return Err(RegistryError::DuplicateSequence { date, sequence });
        }

        inner.rows.entry(date).or_default().push(row.clone());
        Ok(())
    }

    fn read_rows(&self, date: NaiveDate) -> Result<Vec<Ticket>, RegistryError> {
        Self::check_available(&self.lock())?;
        Ok(self.rows(date))
    }

    fn count_rows(&self, date: NaiveDate) -> Result<u32, RegistryError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.rows.get(&date).map_or(0, |rows| rows.len() as u32))
    }

    fn find_row(&self, date: NaiveDate, sequence: u32) -> Result<Option<Ticket>, RegistryError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .rows
            .get(&date)
            .and_then(|rows| rows.iter().find(|t| t.sequence_number == sequence))
            .cloned())
    }

    fn clear_rows(&self, date: NaiveDate) -> Result<usize, RegistryError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.rows.remove(&date).map_or(0, |rows| rows.len()))
    }
}
