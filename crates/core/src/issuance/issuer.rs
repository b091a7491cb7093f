use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{Voucher, VoucherWriter};
use crate::audit::{AuditEvent, AuditHandle, AuditSink};
use crate::clock::Calendar;
use crate::metrics;
use crate::registry::{Registry, RegistryError, Ticket};
use crate::sequence::{ResetReport, SequenceAuthority, SequenceError};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    /// Every attempt collided with a number another issuer had just taken.
    #[error("Sequence contention: gave up after {attempts} attempts")]
    Contention { attempts: u32 },
}

impl IssueError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            IssueError::Validation(_) => "validation",
            IssueError::Sequence(_) | IssueError::Registry(_) => "registry",
            IssueError::Contention { .. } => "contention",
        }
    }
}

/// A successfully issued ticket.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub ticket: Ticket,
    /// `None` when vouchers are disabled or generation failed.
    pub voucher: Option<Voucher>,
    pub warnings: Vec<String>,
}

/// Ticket issuance protocol: validate, check the day, append, then commit.
///
/// The registry append is the commit point. Nothing (counter, voucher) moves
/// before it succeeds, and nothing after it can undo it.
pub struct TicketIssuer {
    authority: Arc<SequenceAuthority>,
    registry: Arc<dyn Registry>,
    vouchers: Option<Arc<dyn VoucherWriter>>,
    calendar: Calendar,
    max_retries: u32,
    issue_lock: Mutex<()>,
    audit: Option<AuditHandle>,
}

impl TicketIssuer {
    pub fn new(
        authority: Arc<SequenceAuthority>,
        registry: Arc<dyn Registry>,
        calendar: Calendar,
        max_retries: u32,
    ) -> Self {
        Self {
            authority,
            registry,
            vouchers: None,
            calendar,
            max_retries,
            issue_lock: Mutex::new(()),
            audit: None,
        }
    }

    pub fn with_vouchers(mut self, writer: Arc<dyn VoucherWriter>) -> Self {
        self.vouchers = Some(writer);
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn authority(&self) -> &Arc<SequenceAuthority> {
        &self.authority
    }

    /// Reset `date` between issuances, so an append already in flight lands
    /// before the wipe rather than after it.
    pub async fn reset_day(
        &self,
        date: chrono::NaiveDate,
        actor: &str,
    ) -> Result<ResetReport, SequenceError> {
        let _guard = self.issue_lock.lock().await;
        self.authority.reset(date, actor)
    }

    pub async fn issue_ticket(
        &self,
        name: &str,
        contact: &str,
        issued_by: &str,
    ) -> Result<IssueOutcome, IssueError> {
        let name = name.trim();
        let contact = contact.trim();
        if name.is_empty() || contact.is_empty() {
            metrics::ISSUE_FAILURES.with_label_values(&["validation"]).inc();
            return Err(IssueError::Validation(
                "name and contact are both required".to_string(),
            ));
        }

        let _guard = self.issue_lock.lock().await;

        let day = match self.authority.ensure_current_day() {
            Ok(day) => day,
            Err(e) => return Err(self.fail(self.calendar.today(), issued_by, e.into())),
        };
        let date = day.date;
        let mut warnings = day.warnings;

        let mut conflicts = 0;
        let ticket = loop {
            let n = match self.authority.cached_counter() {
                Ok(counter) => counter + 1,
                Err(e) => return Err(self.fail(date, issued_by, e.into())),
            };

            let local = self.calendar.local_now();
            let ticket = Ticket {
                date,
                day: Calendar::day_name(&local),
                time: Calendar::time_of_day(&local),
                name: name.to_string(),
                contact: contact.to_string(),
                sequence_number: n,
                created_at: self.calendar.now(),
            };

            match self.registry.append_ticket_row(date, &ticket) {
                Ok(()) => break ticket,
                Err(RegistryError::DuplicateSequence { sequence, .. }) => {
                    conflicts += 1;
                    metrics::SEQUENCE_CONFLICTS.inc();
                    warn!(date = %date, sequence, attempt = conflicts, "Sequence already taken, resyncing");
                    if conflicts > self.max_retries {
                        return Err(self.fail(
                            date,
                            issued_by,
                            IssueError::Contention {
                                attempts: conflicts,
                            },
                        ));
                    }
                    if let Err(e) = self.authority.resync(date) {
                        return Err(self.fail(date, issued_by, e.into()));
                    }
                }
                Err(e) => return Err(self.fail(date, issued_by, IssueError::Registry(e))),
            }
        };

        // The row is durable; a stale counter only costs a resync next time.
        if let Err(e) = self.authority.commit(date, ticket.sequence_number) {
            warn!(date = %date, sequence = ticket.sequence_number, "Counter not advanced: {}", e);
            warnings.push(format!("sequence counter not advanced: {}", e));
        }
        metrics::TICKETS_ISSUED.inc();
        info!(
            date = %date,
            sequence = ticket.sequence_number,
            issued_by,
            "Ticket issued"
        );
        self.audit.record(AuditEvent::TicketIssued {
            date,
            sequence_number: ticket.sequence_number,
            name: ticket.name.clone(),
            issued_by: issued_by.to_string(),
            conflicts,
        });

        let voucher = self.generate_voucher(&ticket, &mut warnings);

        Ok(IssueOutcome {
            ticket,
            voucher,
            warnings,
        })
    }

    fn generate_voucher(&self, ticket: &Ticket, warnings: &mut Vec<String>) -> Option<Voucher> {
        let writer = self.vouchers.as_ref()?;
        let mut voucher = Voucher::for_ticket(ticket);

        match writer.write(ticket, &voucher) {
            Ok(location) => {
                metrics::VOUCHERS.with_label_values(&["written"]).inc();
                voucher.location = Some(location);
                Some(voucher)
            }
            Err(e) => {
                metrics::VOUCHERS.with_label_values(&["failed"]).inc();
                warn!(
                    date = %ticket.date,
                    sequence = ticket.sequence_number,
                    "Voucher generation failed: {}",
                    e
                );
                warnings.push(format!("voucher not generated: {}", e));
                self.audit.record(AuditEvent::VoucherFailed {
                    date: ticket.date,
                    sequence_number: ticket.sequence_number,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn fail(&self, date: chrono::NaiveDate, issued_by: &str, e: IssueError) -> IssueError {
        metrics::ISSUE_FAILURES.with_label_values(&[e.reason()]).inc();
        error!(date = %date, issued_by, "Ticket issuance failed: {}", e);
        self.audit.record(AuditEvent::TicketIssueFailed {
            date,
            issued_by: issued_by.to_string(),
            reason: e.to_string(),
        });
        e
    }
}
